pub mod analyzer;
pub mod credentials;
pub mod image_decoder;
pub mod metrics;
pub mod providers;

pub use analyzer::Analyzer;
pub use credentials::{ApiKeyCredentials, CredentialProvider, OAuthCredentials, OAuthSettings};
pub use image_decoder::{decode_image, DecodedImage, ImageDecodeError};
