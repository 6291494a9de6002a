mod diagnostics;
mod loading;
mod schema;
mod tracing_init;
