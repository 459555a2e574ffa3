pub mod move_record;

pub use move_record::MoveRecord;
