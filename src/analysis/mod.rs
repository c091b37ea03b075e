pub mod access;
pub mod declaration;
pub mod dialect;
pub mod evaluator;
pub mod extract;
pub mod files;
pub mod module_resolver;
pub mod sandbox;
pub mod syntax;
pub mod unbox;
pub mod value_node;

pub use declaration::{Declaration, DeclarationKind, Lookup};
pub use dialect::Dialect;
pub use evaluator::{to_plain, CanEvaluate, Engine, EngineStats, EvalContext, EvalFlags, EvaluationOverrides};
pub use extract::{
    object_like_to_map, ComponentMatchers, ExtractRequest, ExtractResultByName, ExtractResultItem,
    ExtractedQuery, FunctionMatchers, JsxElementProps, QueryKind, ResultKind, TaggedTemplateMatchers,
};
pub use files::{FileTable, ModuleLookup, SourceFile};
pub use module_resolver::ModuleResolver;
pub use sandbox::{ConstInterpreter, EvalOutcome, EvaluationOptions, Sandbox};
pub use unbox::Unboxed;
pub use value_node::{BoxNode, DebugView, MapEntries, ValueKind, ValueNode};
