/// Implements process-wide logging setup with console and file output.
pub mod loggerlocal;
