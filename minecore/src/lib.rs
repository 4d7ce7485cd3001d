// chemistry module
pub mod chemistry {
    pub mod constants;
    pub mod formula;
}

// data module
pub mod data {
    pub mod adduct;
    pub mod compound;
    pub mod model;
    pub mod peak;
    pub mod spectrum;
}

// algorithm module
pub mod algorithm {
    pub mod relevance;
    pub mod similarity;
    pub mod spectral;
}

// annotation module
pub mod annotation {
    pub mod annotator;
    pub mod cluster;
    pub mod filter;
    pub mod ranking;
    pub mod summary;
}

pub mod error;
pub mod params;
pub mod search;
pub mod store;
