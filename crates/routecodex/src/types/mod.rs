pub mod canonical;
pub mod protocol;

pub use canonical::{
	CanonicalMessage, CanonicalRequest, CanonicalTool, Content, ContentBlock, MessageRole,
	RequestMetadata, RequestParameters, ToolCall,
};
pub use protocol::WireProtocol;
