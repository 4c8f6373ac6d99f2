mod result_set;
mod row;

pub use result_set::{ReadResult, ResultSet};
pub use row::DbRow;
