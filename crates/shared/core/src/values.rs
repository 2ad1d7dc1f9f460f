use chrono::{DateTime, Utc};

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Ticker symbol of a tradeable currency (e.g. `BTC`)
pub type Symbol = String;
