pub mod linearize;
pub mod loader;
pub mod model;

pub use linearize::linearize;
pub use loader::{load_conversations, LoadStats};
pub use model::{
    ConversationRecord, LoadedConversation, MessageView, RawConversation, UnresolvedRef,
};
