pub mod config;
pub mod dispatch;
pub mod frame;
pub mod histogram;
pub mod postgres;
pub mod session;
pub mod traits;
pub mod transform;
pub mod types;
pub mod websocket;

pub use config::{ConfigError, FrontendConfig, ServerConfig};
pub use dispatch::dispatch;
pub use frame::{Cell, Frame, SplitFrame};
pub use postgres::PostgresWarehouse;
pub use session::{SessionState, SourceBinding};
pub use traits::{TableHandle, Warehouse, WarehouseError, WarehouseResult};
pub use types::*;
pub use websocket::{handle_websocket, AppState};
