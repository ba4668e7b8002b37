//! Transport encoding of consent records.
//!
//! Records travel as URL-and-filename-safe base64. Historically one fork of
//! the SDK emitted padded output and the other omitted padding (the framework
//! guidelines ask for the latter), so the output mode is a configuration
//! flag. Decoding is indifferent and accepts both forms.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

pub use base64::DecodeError;

/// Whether serialized output carries `=` padding.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Base64Padding {
    Padded,
    #[default]
    Unpadded,
}

const URL_SAFE_INDIFFERENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn decode(s: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_INDIFFERENT.decode(s)
}

pub fn encode(bytes: &[u8], padding: Base64Padding) -> String {
    match padding {
        Base64Padding::Padded => base64::engine::general_purpose::URL_SAFE.encode(bytes),
        Base64Padding::Unpadded => base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes),
    }
}
