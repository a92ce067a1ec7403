pub mod add_row_use_case;
pub mod ports;

pub use add_row_use_case::AddRowUseCase;
pub use ports::SpreadsheetPort;
