use serde::Deserialize;
use serde::Serialize;

use ccore::id::RecordId;

use crate::record;
use crate::FrameError;
use crate::MANIFEST_NAMESPACE;

/// What the reassembled bytes are.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentInfo {
    pub mime_type: String,
    pub charset: Option<String>,
    pub filename: Option<String>,
    pub compression: Option<String>,
}

/// Ordered list of chunk records making up one file.
///
/// Field order on the wire is fixed: mime type, charset, filename,
/// compression flag, then one 32 byte push per chunk id. Optional fields are
/// written as empty pushes and read back as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub content_info: ContentInfo,
    pub chunk_refs: Vec<RecordId>,
}

const CONTENT_FIELDS: usize = 4;

fn opt_bytes(v: &Option<String>) -> &[u8] {
    v.as_deref().unwrap_or("").as_bytes()
}

impl Manifest {
    pub fn new(content_info: ContentInfo, chunk_refs: Vec<RecordId>) -> Self {
        Manifest {
            content_info,
            chunk_refs,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let info = &self.content_info;

        let mut fields: Vec<&[u8]> = Vec::with_capacity(CONTENT_FIELDS + self.chunk_refs.len());
        fields.push(info.mime_type.as_bytes());
        fields.push(opt_bytes(&info.charset));
        fields.push(opt_bytes(&info.filename));
        fields.push(opt_bytes(&info.compression));
        fields.extend(self.chunk_refs.iter().map(|id| &id.as_bytes()[..]));

        record::encode(MANIFEST_NAMESPACE.as_bytes(), &fields)
    }

    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        let record = record::decode(raw)?;
        record.expect_namespace(MANIFEST_NAMESPACE)?;

        let mut fields = record.fields.into_iter();
        let mut text = |name: &'static str| -> Result<String, FrameError> {
            let field = fields.next().ok_or(FrameError::MissingField(name))?;
            String::from_utf8(field.to_vec()).map_err(|_| FrameError::InvalidUtf8(name))
        };
        let none_if_empty = |s: String| if s.is_empty() { None } else { Some(s) };

        let content_info = ContentInfo {
            mime_type: text("mime type")?,
            charset: none_if_empty(text("charset")?),
            filename: none_if_empty(text("filename")?),
            compression: none_if_empty(text("compression")?),
        };

        let chunk_refs = fields
            .enumerate()
            .map(|(index, field)| {
                RecordId::from_slice(field).map_err(|_| FrameError::BadChunkRef {
                    index,
                    len: field.len(),
                })
            })
            .collect::<Result<Vec<RecordId>, FrameError>>()?;

        Ok(Manifest {
            content_info,
            chunk_refs,
        })
    }
}
