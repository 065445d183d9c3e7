// identifier module
pub mod ident {
    pub mod identifier;
    pub mod collection;
    pub mod selector;
}

// calibration module
pub mod calibration {
    pub mod polynomial;
    pub mod position;
    pub mod fitting;
    pub mod list;
}

// data module
pub mod data {
    pub mod histogram;
    pub mod matrix;
    pub mod spectrum;
}

// cut module
pub mod cut {
    pub mod region;
    pub mod engine;
}

// fit module
pub mod fit {
    pub mod registry;
}

pub mod config;
pub mod error;
pub mod session;
