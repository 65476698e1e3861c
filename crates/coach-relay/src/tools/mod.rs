//! Built-in tools that models can use.

mod stock;

pub use stock::StockDetailsTool;
