use std::io::Read;

/// Read from `data` until `buf` is full or the reader is exhausted.
///
/// Returns `(eof, bytes_read)`, `eof` is only set if the reader returned 0
/// before the buffer was filled.
pub fn fill_buf<R: Read>(data: &mut R, buf: &mut [u8]) -> std::io::Result<(bool, usize)> {
    let mut buf_read = 0;

    while buf_read < buf.len() {
        match data.read(&mut buf[buf_read..]) {
            Ok(0) => return Ok((true, buf_read)),
            Ok(x) => buf_read += x,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
    }
    Ok((false, buf_read))
}

#[cfg(test)]
mod test_fill_buf {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn big_buf_small_vec() {
        let mut in_buf: Cursor<Vec<u8>> = Cursor::new(vec![1, 2]);
        let mut buf: [u8; 4] = [0; 4];

        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (true, 2));
        assert_eq!(&buf, &[1, 2, 0, 0]);
    }

    #[test]
    fn small_buf_big_vec() {
        let mut in_buf: Cursor<Vec<u8>> = Cursor::new(vec![1, 2, 3, 4]);
        let mut buf: [u8; 2] = [0; 2];

        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (false, 2));
        assert_eq!(&buf, &[1, 2]);
    }

    #[test]
    fn same_buf_same_vec() {
        let mut in_buf: Cursor<Vec<u8>> = Cursor::new(vec![1, 2, 3, 4]);
        let mut buf: [u8; 4] = [0; 4];

        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (false, 4));
        assert_eq!(&buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn empty_reader() {
        let mut in_buf: Cursor<Vec<u8>> = Cursor::new(vec![]);
        let mut buf: [u8; 4] = [0; 4];

        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (true, 0));
    }
}
