pub mod balance_writer;
pub mod order_reader;
