pub mod dispatcher;
pub mod downsampler;
pub mod query;
