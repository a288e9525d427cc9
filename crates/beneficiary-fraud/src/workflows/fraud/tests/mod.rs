mod common;
mod evaluation;
mod store;
