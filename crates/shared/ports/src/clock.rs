use papertrade_core::Timestamp;

/// Source of "now" for trade stamps, account creation and valuation hours
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}
