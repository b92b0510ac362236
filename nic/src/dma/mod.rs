//! DMA engines and the memory they talk to.
//!
//! The reader fetches send buffers from memory into the reservation buffer;
//! the writer drains received packets into memory. Both split transfers into
//! aligned power-of-two sub-transfers and track them by transfer id.

pub mod ids;
pub mod port;
pub mod reader;
pub mod split;
pub mod writer;

pub use ids::{IdPool, TransferId};
pub use port::{CompletionOrder, MemoryPort, ReadBeat, SimMemory, WriteAck};
pub use reader::{Reader, ReaderState, ReaderStats};
pub use split::next_chunk;
pub use writer::{Writer, WriterState, WriterStats};
