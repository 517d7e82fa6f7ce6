use crate::push::{write_push, PushReader};
use crate::FrameError;
use crate::{CHUNK_NAMESPACE, RECORD_PREFIX};

/// A decoded record, borrows from the raw bytes it was read from.
#[derive(Debug, PartialEq)]
pub struct Record<'a> {
    pub namespace: &'a [u8],
    pub fields: Vec<&'a [u8]>,
}

impl<'a> Record<'a> {
    pub fn namespace_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.namespace).ok()
    }

    pub fn expect_namespace(&self, namespace: &str) -> Result<(), FrameError> {
        if self.namespace == namespace.as_bytes() {
            Ok(())
        } else {
            Err(FrameError::WrongNamespace(
                String::from_utf8_lossy(self.namespace).into_owned(),
            ))
        }
    }
}

pub fn encode(namespace: &[u8], fields: &[&[u8]]) -> Result<Vec<u8>, FrameError> {
    let body: usize = fields.iter().map(|f| f.len() + 5).sum();
    let mut out = Vec::with_capacity(RECORD_PREFIX.len() + namespace.len() + 5 + body);

    out.extend_from_slice(&RECORD_PREFIX);
    write_push(&mut out, namespace)?;
    for field in fields {
        write_push(&mut out, field)?;
    }

    Ok(out)
}

/// Decode a full record, the prefix must be present.
pub fn decode(raw: &[u8]) -> Result<Record<'_>, FrameError> {
    if !raw.starts_with(&RECORD_PREFIX) {
        return Err(FrameError::MissingPrefix);
    }
    decode_from(raw, RECORD_PREFIX.len())
}

/// Decode the pushes starting at `offset`, no prefix check.
pub fn decode_from(raw: &[u8], offset: usize) -> Result<Record<'_>, FrameError> {
    let mut pushes = PushReader::at(raw, offset);

    let namespace = match pushes.next() {
        Some(ns) => ns?,
        None => return Err(FrameError::MissingNamespace),
    };
    let fields = pushes.collect::<Result<Vec<&[u8]>, FrameError>>()?;

    Ok(Record { namespace, fields })
}

pub fn encode_chunk(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    encode(CHUNK_NAMESPACE.as_bytes(), &[payload])
}

/// Pull the chunk bytes back out of a chunk record.
pub fn decode_chunk(raw: &[u8]) -> Result<&[u8], FrameError> {
    let record = decode(raw)?;
    record.expect_namespace(CHUNK_NAMESPACE)?;

    record
        .fields
        .first()
        .copied()
        .ok_or(FrameError::MissingField("chunk data"))
}

#[cfg(test)]
mod test_record {
    use super::*;
    use crate::MANIFEST_NAMESPACE;

    #[test]
    fn round_trip_every_length_class() {
        let fields: Vec<Vec<u8>> = [0usize, 75, 76, 255, 256, 65535, 65536]
            .iter()
            .map(|len| vec![0x5a; *len])
            .collect();
        let borrowed: Vec<&[u8]> = fields.iter().map(|f| &f[..]).collect();

        let raw = encode(b"ns", &borrowed).unwrap();
        let record = decode(&raw).unwrap();

        assert_eq!(record.namespace, b"ns");
        assert_eq!(record.fields, borrowed);
    }

    #[test]
    fn prefix_layout() {
        let raw = encode(b"ab", &[&b"xyz"[..]]).unwrap();
        assert_eq!(raw, vec![0x00, 0x6a, 0x02, b'a', b'b', 0x03, b'x', b'y', b'z']);
    }

    #[test]
    fn missing_prefix() {
        assert_eq!(decode(&[0x02, b'a', b'b']), Err(FrameError::MissingPrefix));
    }

    #[test]
    fn empty_record() {
        assert_eq!(decode(&RECORD_PREFIX), Err(FrameError::MissingNamespace));
    }

    #[test]
    fn truncated_field_is_an_error() {
        let payload = vec![1u8; 1000];
        let raw = encode_chunk(&payload).unwrap();

        // Backend cut the response short
        let err = decode_chunk(&raw[..raw.len() - 10]).unwrap_err();
        assert!(err.is_truncation(), "{:?}", err);
        match err {
            FrameError::Truncated { declared, available, .. } => {
                assert_eq!(declared, 1000);
                assert_eq!(available, 990);
            }
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn chunk_round_trip() {
        let payload = b"some chunk bytes".to_vec();
        let raw = encode_chunk(&payload).unwrap();

        assert_eq!(decode_chunk(&raw).unwrap(), &payload[..]);
    }

    #[test]
    fn chunk_wrong_namespace() {
        let raw = encode(MANIFEST_NAMESPACE.as_bytes(), &[&b"x"[..]]).unwrap();

        assert_eq!(
            decode_chunk(&raw),
            Err(FrameError::WrongNamespace(MANIFEST_NAMESPACE.to_string()))
        );
    }

    #[test]
    fn decode_from_offset_skips_leading_bytes() {
        let raw = encode(b"ns", &[&b"a"[..]]).unwrap();
        let record = decode_from(&raw, 2).unwrap();

        assert_eq!(record.namespace_str(), Some("ns"));
        assert_eq!(record.fields, vec![&b"a"[..]]);
    }
}
