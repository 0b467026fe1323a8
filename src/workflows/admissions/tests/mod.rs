mod common;

mod sweep;
