pub mod catalog;
pub mod dates;
pub mod request;
pub mod scrape;
pub mod session;
