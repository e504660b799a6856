//! Prompt interpretation for the opsgate boundary.
//!
//! This crate turns a free-text admin instruction into a structured
//! `ActionRequest` by calling an external text-generation endpoint with a
//! constrained system instruction, then extracting the first JSON object from
//! the reply.
//!
//! # Safety principle
//!
//! The model is strictly a translator. It never authorizes or executes
//! anything: the authorization gate and the execution forwarder sit behind it
//! and make every enforcement decision deterministically. Tests substitute a
//! scripted [`llm::LlmClient`] and never assert on live model wording.

pub mod interpreter;
pub mod llm;

pub use interpreter::{InterpretError, PromptInterpreter};
pub use llm::{HttpLlmClient, LlmClient, ScriptedLlmClient};
