//! Core types for the Mudscript runtime.
//!
//! This crate provides the value representation, the prototype-object
//! system, the function model, lexical environments, bytecode chunks, and
//! the error taxonomy shared by the compiler, the virtual machine and the
//! standard library.

pub mod chunk;
pub mod environment;
pub mod error;
pub mod function;
pub mod object;
pub mod value;

pub use chunk::Chunk;
pub use environment::{EnvError, Environment};
pub use error::{CompileError, MudError, RuntimeError, TracebackEntry};
pub use function::{
    attach_constructor_prototype, Function, FunctionKind, NativeCallable, NativeContext,
    NativeError, NativeFunction, NativeResult, ScriptFunction,
};
pub use object::{
    chain_has_constructor, find_getter, find_setter, lookup_field, Object, ObjectRef,
};
pub use value::{ArrayRef, Value};
