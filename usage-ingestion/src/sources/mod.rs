pub mod delimited_file;
pub mod workbook_file;

pub use delimited_file::{read_delimited, DelimitedTableSource};
pub use workbook_file::{table_from_range, WorkbookSource};
