use std::io::Read;

use ccore::buf::fill_buf;

/// Splits a reader into fixed size chunks, the last one may be short.
///
/// Yields `(index, bytes)`. A reader that is empty from the start yields
/// nothing.
pub struct Chunker<R: Read> {
    inner: R,
    size: usize,
    chunk: u32,
    done: bool,
}

impl<R: Read> Chunker<R> {
    pub fn new(reader: R, size: usize) -> Self {
        Chunker {
            inner: reader,
            size,
            chunk: 0,
            done: false,
        }
    }
}

impl<R: Read> Iterator for Chunker<R> {
    type Item = std::io::Result<(u32, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut in_buf = vec![0u8; self.size];
        match fill_buf(&mut self.inner, &mut in_buf) {
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
            Ok((true, 0)) => {
                self.done = true;
                None
            }
            Ok((eof, len)) => {
                self.done = eof;
                in_buf.truncate(len);

                let idx = self.chunk;
                self.chunk += 1;
                Some(Ok((idx, in_buf)))
            }
        }
    }
}

/// Number of chunks `size` bytes split into.
pub fn chunk_count(size: u64, chunk_size: usize) -> u32 {
    size.div_ceil(chunk_size as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn splits_with_short_tail() {
        let data = vec![7u8; 250_000];
        let chunks: Vec<(u32, Vec<u8>)> = Chunker::new(Cursor::new(data), 95_000)
            .map(|c| c.unwrap())
            .collect();

        let lens: Vec<usize> = chunks.iter().map(|(_, c)| c.len()).collect();
        let idx: Vec<u32> = chunks.iter().map(|(i, _)| *i).collect();

        assert_eq!(lens, vec![95_000, 95_000, 60_000]);
        assert_eq!(idx, vec![0, 1, 2]);
        assert_eq!(chunk_count(250_000, 95_000), 3);
    }

    #[test]
    fn exact_multiple() {
        let chunks: Vec<_> = Chunker::new(Cursor::new(vec![1u8; 20]), 10)
            .map(|c| c.unwrap())
            .collect();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunk_count(20, 10), 2);
    }

    #[test]
    fn empty_input() {
        assert!(Chunker::new(Cursor::new(Vec::<u8>::new()), 10).next().is_none());
        assert_eq!(chunk_count(0, 10), 0);
    }
}
