pub mod adapter;
pub mod executor;
pub mod final_answer;
pub mod registry;
pub mod respond;

pub use adapter::{DatasetTool, FunctionSpec, ToolHandler};
pub use executor::ToolExecutor;
pub use final_answer::{FinalAnswerTool, FINAL_ANSWER};
pub use registry::{Tool, ToolArguments, ToolInput, ToolInputs, ToolRegistry};
pub use respond::{RespondToCustomerTool, RESPOND_CUSTOMER};
