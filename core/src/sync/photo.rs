//! Photo transcoding between upload bytes and the durable string form
//! kept in the unsynced queue. Both directions are pure and independent
//! of the storage layer.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sl_cloud_api::StoryPhoto;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PhotoError {
	#[error("stored photo is not a base64 data URI")]
	NotDataUri,
	#[error("stored photo payload is not valid base64: {0}")]
	Base64(#[from] base64::DecodeError),
}

/// Encodes captured photo bytes as a `data:` URI so they survive inside a
/// JSON record.
pub fn encode_photo(bytes: &[u8], mime: &str) -> String {
	format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Reverses [`encode_photo`], recovering the bytes and MIME type for
/// upload.
pub fn decode_photo(data_uri: &str) -> Result<StoryPhoto, PhotoError> {
	let rest = data_uri.strip_prefix("data:").ok_or(PhotoError::NotDataUri)?;
	let (mime, payload) = rest.split_once(";base64,").ok_or(PhotoError::NotDataUri)?;

	let mime = if mime.is_empty() {
		"application/octet-stream"
	} else {
		mime
	};

	Ok(StoryPhoto {
		mime: mime.to_string(),
		bytes: STANDARD.decode(payload)?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn round_trips_bytes_and_mime() {
		let bytes = vec![0xffu8, 0xd8, 0xff, 0xe0, 0x00, 0x10];

		let encoded = encode_photo(&bytes, "image/jpeg");
		assert!(encoded.starts_with("data:image/jpeg;base64,"));

		let decoded = decode_photo(&encoded).unwrap();
		assert_eq!(decoded.bytes, bytes);
		assert_eq!(decoded.mime, "image/jpeg");
	}

	#[test]
	fn rejects_plain_urls() {
		let result = decode_photo("https://example.com/photo.jpg");
		assert!(matches!(result, Err(PhotoError::NotDataUri)));
	}

	#[test]
	fn rejects_invalid_payload() {
		let result = decode_photo("data:image/png;base64,@@@@");
		assert!(matches!(result, Err(PhotoError::Base64(_))));
	}
}
