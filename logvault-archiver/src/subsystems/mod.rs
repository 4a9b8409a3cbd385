pub mod enumerate;
pub mod fetch;
pub mod upload;
