pub mod market_data_repo;
pub mod signals_repo;

pub use market_data_repo::MarketDataRepository;
pub use signals_repo::SignalsRepository;
