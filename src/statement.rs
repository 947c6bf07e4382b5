//! Statement execution and the row cursor.
//!
//! A query is one POST followed by a chain of GETs the server hands out via
//! `nextUri`. Two cooperative tasks pipeline that chain: a fetcher that
//! turns URIs into HTTP responses and a parser that decodes envelopes and
//! feeds the next URI back to the fetcher *before* delivering the envelope,
//! so the next page is already being fetched while the caller decodes the
//! current one.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::{
    static_header_name, Client, CLIENT_CAPABILITIES_HEADER, DEFAULT_CANCEL_QUERY_TIMEOUT,
    PREPARED_STATEMENT_HEADER, PREPARED_STATEMENT_NAME, USER_HEADER,
};
use crate::error::Error;
use crate::literal::{self, IntoLiteral, Literal};
use crate::progress::{ProgressUpdater, QueryProgressInfo};
use crate::protocol::{check_response_error, QueryResults};
use crate::typesig::Column;
use crate::value::{decode_value, Value};

/// A prepared statement handle.
///
/// Preparing does not contact the server; it packages the SQL with a
/// reference to the connection. At most one cursor can be live per handle,
/// which the borrow on [`Statement::query`] enforces.
pub struct Statement {
    client: Client,
    sql: String,
}

impl Statement {
    pub(crate) fn new(client: Client, sql: &str) -> Self {
        Statement {
            client,
            sql: sql.to_string(),
        }
    }

    /// The SQL text this handle was prepared with.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Starts building a query execution.
    pub fn query(&mut self) -> QueryBuilder<'_> {
        QueryBuilder {
            stmt: self,
            params: Vec::new(),
            headers: Vec::new(),
            progress_updater: None,
            progress_period: None,
            cancel: CancellationToken::new(),
            timeout: None,
        }
    }
}

/// Fluent builder for one query execution.
pub struct QueryBuilder<'a> {
    stmt: &'a mut Statement,
    params: Vec<Literal>,
    headers: Vec<(String, String)>,
    progress_updater: Option<Arc<dyn ProgressUpdater>>,
    progress_period: Option<Duration>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl<'a> QueryBuilder<'a> {
    /// Binds a parameter value. Bound statements are rewritten into
    /// `EXECUTE <name> USING <literals>` against a server-side prepared
    /// statement carrying the original SQL.
    pub fn bind<T: IntoLiteral>(mut self, value: T) -> Self {
        self.params.push(value.into_literal());
        self
    }

    /// Adds a per-request header override. An `X-Presto-User` override is
    /// sticky: the cursor's cancellation request repeats it.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Registers a progress observer on the connection. Must be paired
    /// with [`progress_period`](Self::progress_period).
    pub fn progress_callback(mut self, updater: Arc<dyn ProgressUpdater>) -> Self {
        self.progress_updater = Some(updater);
        self
    }

    /// Sets the minimum interval between progress events. Must be paired
    /// with [`progress_callback`](Self::progress_callback).
    pub fn progress_period(mut self, period: Duration) -> Self {
        self.progress_period = Some(period);
        self
    }

    /// Propagates a caller-owned cancellation token into every HTTP
    /// exchange of this query.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Per-request timeout for this query; defaults to the connection's
    /// query timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Submits the query and returns a cursor positioned at the first page
    /// that carries rows.
    pub async fn fetch(self) -> Result<QueryRows<'a>, Error> {
        let mut rows = self.start().await?;
        rows.fetch().await?;
        Ok(rows)
    }

    /// Submits the query, drains every page, and reports the number of
    /// affected rows.
    pub async fn execute(self) -> Result<ExecResult, Error> {
        let mut rows = self.start().await?;
        while rows.fetch().await? {}
        let rows_affected = rows.rows_affected();
        rows.close().await?;
        Ok(ExecResult { rows_affected })
    }

    async fn start(self) -> Result<QueryRows<'a>, Error> {
        let client = self.stmt.client.clone();
        let sql = self.stmt.sql.clone();

        let mut headers = HeaderMap::new();
        // Without this capability the server truncates temporal values to
        // millisecond precision.
        headers.insert(
            static_header_name(CLIENT_CAPABILITIES_HEADER),
            HeaderValue::from_static("PARAMETRIC_DATETIME"),
        );

        let mut user_override: Option<String> = None;
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("invalid header name {:?}: {}", name, e)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("invalid value for {}: {}", name, e)))?;
            if name.eq_ignore_ascii_case(USER_HEADER) {
                user_override = Some(value.clone());
            }
            headers.append(header_name, header_value);
        }

        {
            let mut tracker = client.progress_tracker().lock();
            if let Some(updater) = self.progress_updater {
                tracker.updater = Some(updater);
            }
            if let Some(period) = self.progress_period {
                tracker.period = period;
            }
            if tracker.updater.is_some() != (tracker.period > Duration::ZERO) {
                return Err(Error::InvalidProgressHeaders);
            }
        }

        let mut fragments = Vec::with_capacity(self.params.len());
        for param in &self.params {
            fragments.push(literal::serialize(param)?);
        }

        let query = if fragments.is_empty() {
            sql.clone()
        } else {
            let prepared = static_header_name(PREPARED_STATEMENT_HEADER);
            if !headers.contains_key(&prepared) {
                for value in client.prepared_statement_values() {
                    headers.append(prepared.clone(), value);
                }
                let encoded: String =
                    url::form_urlencoded::byte_serialize(sql.as_bytes()).collect();
                let entry = format!("{}={}", PREPARED_STATEMENT_NAME, encoded);
                headers.append(
                    prepared.clone(),
                    HeaderValue::from_str(&entry).map_err(|e| {
                        Error::Config(format!("invalid prepared statement header: {}", e))
                    })?,
                );
            }
            format!(
                "EXECUTE {} USING {}",
                PREPARED_STATEMENT_NAME,
                fragments.join(", ")
            )
        };

        let timeout = self.timeout.unwrap_or_else(|| client.query_timeout());
        let url = client.statement_url()?;
        let response = client
            .round_trip(Method::POST, url, Some(query), headers, timeout, &self.cancel)
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(Error::from)?;
        let results: QueryResults = serde_json::from_str(&body)?;
        check_response_error(status, &results.error)?;

        tracing::debug!(query_id = %results.id, "statement submitted");

        Ok(spawn_pipeline(
            client,
            results,
            user_override,
            timeout,
            self.cancel,
        ))
    }
}

/// Wires up the fetcher and parser tasks, primes them with the submit
/// response's `nextUri`, and returns the cursor.
fn spawn_pipeline<'a>(
    client: Client,
    results: QueryResults,
    user_override: Option<String>,
    timeout: Duration,
    cancel: CancellationToken,
) -> QueryRows<'a> {
    let done = CancellationToken::new();
    let (next_uri_tx, mut next_uri_rx) = mpsc::channel::<String>(1);
    let (http_tx, mut http_rx) = mpsc::channel::<reqwest::Response>(1);
    let (page_tx, page_rx) = mpsc::channel::<QueryResults>(1);
    // Each task writes at most one error, so the channel absorbs late
    // writes without a drain task.
    let (error_tx, error_rx) = mpsc::channel::<Error>(2);

    let fetcher = Fetcher {
        client: client.clone(),
        user: user_override.clone(),
        timeout,
        done: done.clone(),
        cancel: cancel.clone(),
        errors: error_tx.clone(),
    };
    tokio::spawn(async move {
        loop {
            let uri = tokio::select! {
                uri = next_uri_rx.recv() => uri,
                _ = fetcher.done.cancelled() => return,
            };
            let uri = match uri {
                Some(uri) if !uri.is_empty() => uri,
                _ => return,
            };
            let response = match fetcher.get(&uri).await {
                Ok(response) => response,
                Err(e) => {
                    let _ = fetcher.errors.send(e).await;
                    return;
                }
            };
            tokio::select! {
                sent = http_tx.send(response) => {
                    if sent.is_err() {
                        return;
                    }
                }
                _ = fetcher.done.cancelled() => return,
            }
        }
    });

    let parser_done = done.clone();
    let parser_next_uris = next_uri_tx.clone();
    let parser_errors = error_tx.clone();
    tokio::spawn(async move {
        loop {
            let response = tokio::select! {
                response = http_rx.recv() => match response {
                    Some(response) => response,
                    None => return,
                },
                _ = parser_done.cancelled() => return,
            };
            let status = response.status().as_u16();
            let envelope = match response.text().await {
                Ok(body) => match serde_json::from_str::<QueryResults>(&body) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        let _ = parser_errors.send(Error::from(e)).await;
                        return;
                    }
                },
                Err(e) => {
                    let _ = parser_errors.send(Error::from(e)).await;
                    return;
                }
            };
            if let Err(e) = check_response_error(status, &envelope.error) {
                let _ = parser_errors.send(e).await;
                return;
            }
            // Forward the next URI before delivering the envelope; this is
            // what lets the fetcher run one page ahead of the caller.
            tokio::select! {
                _ = parser_next_uris.send(envelope.next_uri.clone()) => {}
                _ = parser_done.cancelled() => return,
            }
            tokio::select! {
                sent = page_tx.send(envelope) => {
                    if sent.is_err() {
                        return;
                    }
                }
                _ = parser_done.cancelled() => return,
            }
        }
    });

    let stats_tx = start_progress_dispatch(&client, &results, &done);

    let next_uri = results.next_uri.clone();
    // Prime the pipeline; the channel is empty so this cannot fail.
    let _ = next_uri_tx.try_send(next_uri.clone());

    QueryRows {
        client,
        query_id: results.id,
        user: user_override,
        next_uri,
        err: None,
        finished: false,
        closed: false,
        columns: None,
        data: Vec::new(),
        row_index: 0,
        rows_affected: results.update_count,
        pages: page_rx,
        errors: error_rx,
        _error_tx: error_tx,
        stats_tx,
        done,
        _cancel: cancel,
        _stmt: PhantomData,
    }
}

/// Starts the observer dispatch task and emits the initial progress event,
/// if an observer is registered on the connection.
fn start_progress_dispatch(
    client: &Client,
    results: &QueryResults,
    done: &CancellationToken,
) -> Option<mpsc::Sender<QueryProgressInfo>> {
    let updater = client.progress_tracker().lock().updater.clone()?;

    let (stats_tx, mut stats_rx) = mpsc::channel::<QueryProgressInfo>(1);
    let dispatcher_done = done.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                info = stats_rx.recv() => match info {
                    Some(info) => updater.update(info),
                    None => return,
                },
                _ = dispatcher_done.cancelled() => return,
            }
        }
    });

    let _ = stats_tx.try_send(QueryProgressInfo {
        query_id: results.id.clone(),
        stats: results.stats.clone(),
    });
    client
        .progress_tracker()
        .lock()
        .mark(Instant::now(), &results.stats.state);

    Some(stats_tx)
}

struct Fetcher {
    client: Client,
    user: Option<String>,
    timeout: Duration,
    done: CancellationToken,
    cancel: CancellationToken,
    errors: mpsc::Sender<Error>,
}

impl Fetcher {
    async fn get(&self, uri: &str) -> Result<reqwest::Response, Error> {
        let url =
            Url::parse(uri).map_err(|e| Error::Decode(format!("invalid nextUri {:?}: {}", uri, e)))?;
        let mut headers = HeaderMap::new();
        if let Some(user) = &self.user {
            headers.insert(
                static_header_name(USER_HEADER),
                HeaderValue::from_str(user)
                    .map_err(|e| Error::Config(format!("invalid user override: {}", e)))?,
            );
        }
        self.client
            .round_trip(Method::GET, url, None, headers, self.timeout, &self.cancel)
            .await
    }
}

/// One decoded row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Outcome of an exec-style statement.
#[derive(Debug, Clone, Copy)]
pub struct ExecResult {
    rows_affected: i64,
}

impl ExecResult {
    pub fn rows_affected(&self) -> i64 {
        self.rows_affected
    }

    /// Presto does not report generated keys.
    pub fn last_insert_id(&self) -> Result<i64, Error> {
        Err(Error::OperationNotSupported("last_insert_id"))
    }
}

enum Step {
    Error(Option<Error>),
    Page(Option<QueryResults>),
}

/// Cursor over the row batches of one query.
///
/// Iterate with [`next`](Self::next) and call [`close`](Self::close) when
/// done; closing an unexhausted cursor cancels the query on the server.
pub struct QueryRows<'a> {
    client: Client,
    query_id: String,
    user: Option<String>,
    next_uri: String,
    err: Option<Error>,
    finished: bool,
    closed: bool,
    columns: Option<Vec<Column>>,
    data: Vec<Vec<serde_json::Value>>,
    row_index: usize,
    rows_affected: i64,
    pages: mpsc::Receiver<QueryResults>,
    errors: mpsc::Receiver<Error>,
    // Held so the error channel never reads as closed while pages are
    // still in flight.
    _error_tx: mpsc::Sender<Error>,
    stats_tx: Option<mpsc::Sender<QueryProgressInfo>>,
    done: CancellationToken,
    _cancel: CancellationToken,
    _stmt: PhantomData<&'a mut Statement>,
}

impl<'a> QueryRows<'a> {
    /// The server-assigned query id.
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Column metadata, available once the first page carrying columns has
    /// been received.
    pub fn columns(&self) -> &[Column] {
        self.columns.as_deref().unwrap_or_default()
    }

    /// The latest `updateCount` reported by the server.
    pub fn rows_affected(&self) -> i64 {
        self.rows_affected
    }

    /// Returns the next row, or `None` once the final page is exhausted.
    /// Errors are sticky: once a call fails, every later call fails the
    /// same way.
    pub async fn next(&mut self) -> Result<Option<Row>, Error> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        while self.columns.is_none() || self.row_index >= self.data.len() {
            if self.finished || self.next_uri.is_empty() {
                self.finished = true;
                return Ok(None);
            }
            match self.fetch().await {
                Ok(true) => {}
                Ok(false) => return Ok(None),
                Err(e) => {
                    self.err = Some(e.clone());
                    return Err(e);
                }
            }
            if self.columns.is_none() && !self.data.is_empty() {
                let err = Error::Decode("page carried data but no column metadata".to_string());
                self.err = Some(err.clone());
                return Err(err);
            }
        }

        let mut values = Vec::new();
        let mut failure: Option<Error> = None;
        if let Some(columns) = &self.columns {
            let raw = &self.data[self.row_index];
            values.reserve(columns.len());
            for (index, column) in columns.iter().enumerate() {
                let cell = match raw.get(index) {
                    Some(cell) => cell,
                    None => {
                        failure = Some(Error::Decode(format!(
                            "row is missing a value for column {}",
                            column.name()
                        )));
                        break;
                    }
                };
                match decode_value(column, cell) {
                    Ok(value) => values.push(value),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
        }
        if let Some(err) = failure {
            self.err = Some(err.clone());
            return Err(err);
        }
        self.row_index += 1;
        Ok(Some(Row { values }))
    }

    /// Pulls envelopes until one carries rows. `Ok(false)` means the
    /// stream ended.
    async fn fetch(&mut self) -> Result<bool, Error> {
        loop {
            let step = tokio::select! {
                // Checked first so a pipeline error is never masked by the
                // page channel closing at the same time.
                biased;
                err = self.errors.recv() => Step::Error(err),
                page = self.pages.recv() => Step::Page(page),
            };
            match step {
                Step::Page(None) | Step::Error(None) => {
                    self.finished = true;
                    return Ok(false);
                }
                Step::Page(Some(page)) => {
                    if page.id.is_empty() {
                        self.finished = true;
                        return Ok(false);
                    }
                    self.init_columns(&page)?;
                    self.row_index = 0;
                    self.next_uri = page.next_uri.clone();
                    self.rows_affected = page.update_count;
                    self.schedule_progress(&page);
                    self.data = page.data;
                    if !self.data.is_empty() {
                        return Ok(true);
                    }
                }
                Step::Error(Some(err)) => {
                    if matches!(err, Error::QueryCancelled) {
                        // Cancellation still tells the server to stop.
                        let _ = self.close_internal().await;
                    }
                    self.err = Some(err.clone());
                    return Err(err);
                }
            }
        }
    }

    /// Builds column metadata from the first envelope that carries columns;
    /// earlier envelopes may omit them.
    fn init_columns(&mut self, page: &QueryResults) -> Result<(), Error> {
        if self.columns.is_some() || page.columns.is_empty() {
            return Ok(());
        }
        let mut columns = Vec::with_capacity(page.columns.len());
        for raw in &page.columns {
            let column =
                Column::new(&raw.name, &raw.type_name, &raw.type_signature).map_err(|e| {
                    Error::Decode(format!("error decoding column type signature: {}", e))
                })?;
            columns.push(column);
        }
        self.columns = Some(columns);
        Ok(())
    }

    fn schedule_progress(&self, page: &QueryResults) {
        let Some(stats_tx) = &self.stats_tx else {
            return;
        };
        if !self
            .client
            .progress_tracker()
            .lock()
            .should_fire(Instant::now(), &page.stats.state)
        {
            return;
        }
        // Drop the event rather than stall paging when the observer lags.
        let _ = stats_tx.try_send(QueryProgressInfo {
            query_id: page.id.clone(),
            stats: page.stats.clone(),
        });
    }

    /// Shuts the pipeline down. If the cursor has not reached the end of
    /// the stream, the query is cancelled on the server with its own
    /// 30-second budget; a `204 No Content` answer counts as success.
    pub async fn close(&mut self) -> Result<(), Error> {
        self.close_internal().await
    }

    async fn close_internal(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.done.cancel();
        self.stats_tx = None;
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if self.query_id.is_empty() {
            return Ok(());
        }

        tracing::debug!(query_id = %self.query_id, "cancelling query");
        let url = self.client.query_url(&self.query_id)?;
        let mut headers = HeaderMap::new();
        if let Some(user) = &self.user {
            headers.insert(
                static_header_name(USER_HEADER),
                HeaderValue::from_str(user)
                    .map_err(|e| Error::Config(format!("invalid user override: {}", e)))?,
            );
        }
        let cancel = CancellationToken::new();
        match self
            .client
            .round_trip(
                Method::DELETE,
                url,
                None,
                headers,
                DEFAULT_CANCEL_QUERY_TIMEOUT,
                &cancel,
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(Error::QueryFailed { status: 204, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for QueryRows<'_> {
    fn drop(&mut self) {
        self.done.cancel();
    }
}
