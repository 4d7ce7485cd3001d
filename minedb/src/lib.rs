pub mod cli;
pub mod config;
pub mod error;

pub mod io {
    pub mod output;
    pub mod peaks;
}

pub mod store {
    pub mod sqlite;
}
