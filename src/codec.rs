//! AMQP 0-9-1 primitive encoding.
//!
//! Method arguments and content properties are built from a small set of
//! primitives: octets, big-endian integers, packed bits, short and long
//! strings, timestamps and self-describing field tables. [`ArgReader`] and
//! [`ArgWriter`] decode and encode them in argument order.
//!
//! ```
//! use amqpframe::codec::{ArgReader, ArgWriter, FieldTable};
//!
//! let mut writer = ArgWriter::new();
//! writer.write_shortstr("orders").unwrap();
//! writer.write_bit(true);
//! writer.write_table(&FieldTable::new().with("x-max-length", 10)).unwrap();
//!
//! let mut reader = ArgReader::new(writer.finish());
//! assert_eq!(reader.read_shortstr().unwrap(), "orders");
//! assert!(reader.read_bit().unwrap());
//! assert_eq!(reader.read_table().unwrap().len(), 1);
//! ```

pub mod error;
mod reader;
pub mod value;
mod writer;

pub use error::CodecError;
pub use reader::ArgReader;
pub use value::{Decimal, FieldTable, FieldValue, Timestamp};
pub use writer::ArgWriter;

#[cfg(test)]
mod tests;
