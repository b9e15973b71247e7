pub mod config;
pub mod filter;
pub mod fog;
pub mod geodesy;
pub mod heading;
pub mod mission;
pub mod pursuit;
pub mod services;
pub mod session;
pub mod units;

pub use config::GameConfig;
pub use session::{GameStatus, RunStatus, Session, SessionSnapshot};
