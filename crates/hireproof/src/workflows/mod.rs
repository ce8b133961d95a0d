pub mod credentialing;
