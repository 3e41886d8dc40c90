/// Data layer: values, types, loading, and filtering.
///
/// Architecture:
/// ```text
///  perflog text (| delimited)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse rows, split display_name → Dataset
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  model    │  rows of Value, column order, native dtypes
///   └──────────┘
///        │               ┌──────────┐
///        ├──────────────►│  types    │  cast values between column types
///        ▼               └──────────┘
///   ┌──────────┐
///   │  filter   │  and / or / series clauses → row mask
///   └──────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod types;
