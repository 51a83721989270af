//! Message body content decoding.
//!
//! Supports the two `Content-Encoding` tokens the reconstructor understands:
//! `gzip` (DEFLATE with a gzip header) and `deflate` (DEFLATE with a zlib
//! header, which is what servers actually send for this token). Anything else
//! is reported as [`HttpError::UnknownContentEncoding`].

use crate::errors::HttpError;

use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::Read;

pub(crate) const GZIP: &str = "gzip";
pub(crate) const DEFLATE: &str = "deflate";

/// Returns `true` if [`decompress`] understands `encoding`.
pub fn is_supported(encoding: &str) -> bool {
    encoding == GZIP || encoding == DEFLATE
}

/// Inflates `data` according to the `Content-Encoding` token `encoding`.
pub fn decompress(encoding: &str, data: &[u8]) -> Result<Vec<u8>, HttpError> {
    let mut decoded = Vec::new();
    match encoding {
        GZIP => {
            GzDecoder::new(data)
                .read_to_end(&mut decoded)
                .map_err(|e| HttpError::Decode(e.to_string()))?;
        }
        DEFLATE => {
            ZlibDecoder::new(data)
                .read_to_end(&mut decoded)
                .map_err(|e| HttpError::Decode(e.to_string()))?;
        }
        other => return Err(HttpError::UnknownContentEncoding(other.to_owned())),
    }
    Ok(decoded)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    pub(crate) fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn core_decode_gzip_round_trip() {
        let body = b"{\"ok\":true,\"messages\":[1,2,3]}";
        assert_eq!(decompress(GZIP, &gzip(body)).unwrap(), body);
    }

    #[test]
    fn core_decode_deflate_round_trip() {
        let body = b"<html><body>hello</body></html>";
        assert_eq!(decompress(DEFLATE, &deflate(body)).unwrap(), body);
    }

    #[test]
    fn core_decode_unknown_encoding() {
        assert_eq!(
            decompress("br", b"anything").unwrap_err(),
            HttpError::UnknownContentEncoding("br".into())
        );
    }

    #[test]
    fn core_decode_corrupt_input() {
        assert!(matches!(
            decompress(GZIP, b"not gzip at all").unwrap_err(),
            HttpError::Decode(_)
        ));
    }
}
