mod common;
mod remote;
