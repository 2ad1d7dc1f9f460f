mod portfolio;
mod quote;
mod trade;
mod user;
mod valuation;

pub use portfolio::{Portfolio, PortfolioError};
pub use quote::Quote;
pub use trade::{TradeAction, TradeRecord, TradeStats};
pub use user::User;
pub use valuation::ValuationHistory;
