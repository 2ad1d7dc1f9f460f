mod in_memory_store;
mod in_memory_trade_cache;

pub use in_memory_store::InMemoryStore;
pub use in_memory_trade_cache::InMemoryTradeHistoryCache;
