mod api;
mod common;
mod consumer;
mod intake;
