//! Record operations on the `downloads` table.

mod read;
mod write;
