pub mod naming;
pub mod writer;

pub use writer::{
    check_output_slot, clean_previous_output, write_output, ConversationDescriptor, WriteItem,
    WriteReport,
};
