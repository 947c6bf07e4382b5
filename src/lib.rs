/*!
An asynchronous Rust client for the Presto and Trino distributed SQL
engines.

The client drives the coordinator's HTTP statement protocol: it submits a
SQL statement, follows the server's `nextUri` paging handoffs until the
query terminates, and streams typed row batches back to the caller while
session mutations announced in response headers are folded into the
connection for subsequent queries.

# Getting started

```no_run
use presto_client::ClientBuilder;

# async fn run() -> Result<(), presto_client::Error> {
let client = ClientBuilder::new("http://user@localhost:8080?catalog=tpch&schema=sf1")
    .build()?;

let mut statement = client.prepare("SELECT name FROM nation WHERE regionkey = ?");
let mut rows = statement.query().bind(1_i64).fetch().await?;
while let Some(row) = rows.next().await? {
    println!("{:?}", row.values());
}
rows.close().await?;
# Ok(())
# }
```

Cell values arrive as [`Value`], a closed set of five shapes; complex
server types (map, array, row) degrade to their canonical JSON text.
Parameters are bound through [`IntoLiteral`]; native floats and raw bytes
are rejected rather than serialized lossily. Wrap exact decimal text in
[`Numeric`] instead.
*/

mod client;
mod config;
mod error;
mod literal;
mod progress;
mod protocol;
mod registry;
mod statement;
mod typesig;
mod value;

pub use client::{Client, ClientBuilder, SpnegoProvider};
pub use config::Config;
pub use error::Error;
pub use literal::{Date, IntoLiteral, Literal, Numeric, Time, TimeTz, Timestamp};
pub use progress::{ProgressUpdater, QueryProgressInfo};
pub use protocol::{QueryStats, StageStats};
pub use registry::{deregister_custom_client, register_custom_client};
pub use statement::{ExecResult, QueryBuilder, QueryRows, Row, Statement};
pub use typesig::{Column, ScanType};
pub use value::Value;
