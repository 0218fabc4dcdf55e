//! 노리: asistente RAG de ejercicio en coreano.
//!
//! Busca en datasets de ejercicios (embeddings con vuelta a palabras clave),
//! analiza la pregunta y genera la respuesta con un LLM vía Rig.

pub mod analyzer;
pub mod api;
pub mod app_state;
pub mod config;
pub mod dataset_store;
pub mod embedding_cache;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod rag;
pub mod retriever;
