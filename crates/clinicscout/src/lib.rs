mod parser;
pub mod export;
pub mod filter;
pub mod geocode;
pub mod join;
pub mod schema;
pub mod scraper;
pub mod session;
pub mod types;

pub use parser::{ParseError, find_first, parse_current_page, parse_records};
pub use crate::scraper::{ScraperError, WebScraper};
pub use session::Session;
pub use types::{Dataset, Record};

pub(crate) const BASE_URL: &str = "https://prodoctorov.ru";

/// Column every service listing carries and the join key across services.
pub const NAME_COLUMN: &str = "Название";

/// Column holding the street address on clinic and service cards.
pub const ADDRESS_COLUMN: &str = "Адрес";
