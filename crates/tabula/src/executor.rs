//! Query execution and result materialization.
//!
//! [`QueryExecutor::run`] takes one [`QueryRequest`] through the full cycle:
//! acquire a pooled connection, submit the SQL, release the connection, then
//! turn the outcome into models. The connection is always back in the pool
//! before the caller sees a result, whichever way the query went.

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tabula_client::instrumentation::{
    DB_SYSTEM, SanitizationConfig, extract_operation, span_names, truncate_string,
};
use tabula_client::{Connection, Connector, FromRow, QueryOutcome, RowIteratorExt};
use tabula_pool::Pool;
use tabula_sql::{JoinPlanNode, SelectOptions};
use tracing::Instrument;

use crate::error::{Error, Failure};
use crate::model::{BuildOptions, Model};

/// Length SQL is cut to in completion log lines.
const LOGGED_SQL_LEN: usize = 64;

/// Stored-procedure calls leave a trailing status packet to drain.
static CALL_STATEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*call\b").expect("CALL pattern is valid"));

/// Per-request execution options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct QueryOptions {
    /// Trace the statement and its timing.
    pub logging: bool,
    /// Reduce materialized rows to the first one.
    pub plain: bool,
    /// Materialize rows even when the statement is not a `SELECT`.
    pub build_results: bool,
    /// Eager-load plan the rows were selected with.
    pub fill_plan: Option<Arc<JoinPlanNode>>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            logging: true,
            plain: false,
            build_results: false,
            fill_plan: None,
        }
    }
}

impl QueryOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable statement tracing.
    #[must_use]
    pub fn logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    /// Enable or disable first-row reduction.
    #[must_use]
    pub fn plain(mut self, enabled: bool) -> Self {
        self.plain = enabled;
        self
    }

    /// Enable or disable materialization for non-`SELECT` statements.
    #[must_use]
    pub fn build_results(mut self, enabled: bool) -> Self {
        self.build_results = enabled;
        self
    }

    /// Set the eager-load plan.
    #[must_use]
    pub fn fill_plan(mut self, plan: Arc<JoinPlanNode>) -> Self {
        self.fill_plan = Some(plan);
        self
    }
}

/// Who a query is run for.
#[derive(Debug)]
pub enum Callee<M> {
    /// Rows are built into new `M` instances.
    Factory,
    /// The query is about this instance; it is handed back afterwards.
    Instance(M),
}

/// One statement to run.
#[derive(Debug)]
pub struct QueryRequest<M> {
    sql: String,
    callee: Option<Callee<M>>,
    options: QueryOptions,
    started: Instant,
}

impl<M> QueryRequest<M> {
    /// A request for `sql` with default options and no callee.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            callee: None,
            options: QueryOptions::default(),
            started: Instant::now(),
        }
    }

    /// Build result rows into `M`.
    #[must_use]
    pub fn factory(mut self) -> Self {
        self.callee = Some(Callee::Factory);
        self
    }

    /// Run the query for `subject`.
    #[must_use]
    pub fn instance(mut self, subject: M) -> Self {
        self.callee = Some(Callee::Instance(subject));
        self
    }

    /// Replace the options.
    #[must_use]
    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// The SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    fn into_subject(self) -> Option<M> {
        match self.callee {
            Some(Callee::Instance(subject)) => Some(subject),
            _ => None,
        }
    }
}

/// What a successful query resolved to.
#[derive(Debug)]
pub enum Materialized<M> {
    /// Every row, built into models.
    Many(Vec<M>),
    /// The first row, built into a model, when `plain` was set.
    One(Option<M>),
    /// The instance the query was run for.
    Subject(M),
    /// The outcome as the connection reported it.
    Raw(QueryOutcome),
}

impl<M> Materialized<M> {
    /// All models, whatever the shape.
    pub fn into_models(self) -> Vec<M> {
        match self {
            Self::Many(models) => models,
            Self::One(model) => model.into_iter().collect(),
            Self::Subject(model) => vec![model],
            Self::Raw(_) => Vec::new(),
        }
    }
}

/// Options for [`QueryExecutor::save_with`].
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct SaveOptions {
    /// Insert with `INSERT IGNORE`.
    pub ignore_duplicates: bool,
    /// Columns to update when the insert hits a duplicate key.
    pub upsert_keys: Option<Vec<String>>,
}

impl SaveOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable `INSERT IGNORE`.
    #[must_use]
    pub fn ignore_duplicates(mut self, enabled: bool) -> Self {
        self.ignore_duplicates = enabled;
        self
    }

    /// Update these columns on a duplicate key.
    #[must_use]
    pub fn upsert_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.upsert_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }
}

/// Runs statements on pooled connections.
///
/// Cloning an executor is cheap; clones share the pool.
pub struct QueryExecutor<C: Connector> {
    pool: Pool<C>,
    sanitization: SanitizationConfig,
}

impl<C: Connector> Clone for QueryExecutor<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            sanitization: self.sanitization.clone(),
        }
    }
}

impl<C: Connector> QueryExecutor<C> {
    /// Create an executor over `pool`.
    pub fn new(pool: Pool<C>) -> Self {
        Self {
            pool,
            sanitization: SanitizationConfig::default(),
        }
    }

    /// Set how SQL is sanitized before it is logged.
    #[must_use]
    pub fn with_sanitization(mut self, config: SanitizationConfig) -> Self {
        self.sanitization = config;
        self
    }

    /// The pool queries run on.
    pub fn pool(&self) -> &Pool<C> {
        &self.pool
    }

    /// Run one request to completion.
    ///
    /// On failure the instance the request was made for, if any, comes back
    /// in the [`Failure`].
    pub async fn run<M: Model>(
        &self,
        request: QueryRequest<M>,
    ) -> Result<Materialized<M>, Failure<M>> {
        let operation = extract_operation(&request.sql);
        let span = tracing::debug_span!(
            span_names::QUERY,
            db.system = DB_SYSTEM,
            db.operation = operation,
        );

        let result = self.submit(&request).instrument(span).await;
        let logging = request.options.logging;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => {
                if logging {
                    tracing::debug!(
                        sql = %self.logged_sql(&request.sql),
                        error = %error,
                        "query failed"
                    );
                }
                return Err(Failure::with_subject(error, request.into_subject()));
            }
        };

        let elapsed = request.started.elapsed();
        let sql = logging.then(|| self.logged_sql(&request.sql));
        let materialized = materialize(request, operation, outcome)?;

        if let Some(sql) = sql {
            tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, sql = %sql, "query finished");
        }
        Ok(materialized)
    }

    /// Acquire, query, drain and release. The connection is back in the pool
    /// by the time this returns.
    async fn submit<M>(&self, request: &QueryRequest<M>) -> Result<QueryOutcome, Error> {
        if request.options.logging {
            tracing::debug!(sql = %self.sanitization.sanitize(&request.sql), "executing query");
        }

        let mut conn = self.pool.acquire().await?;

        let mut result = conn.query(&request.sql).await;
        if result.is_ok() && CALL_STATEMENT.is_match(&request.sql) {
            if let Err(e) = conn.drain_pending().await {
                result = Err(e);
            }
        }
        if let Err(e) = &result {
            if e.is_connection_error() {
                tracing::warn!(error = %e, "connection faulted during query");
                conn.mark_broken();
            }
        }

        self.pool.release(conn).await;
        result.map_err(Error::from)
    }

    fn logged_sql(&self, sql: &str) -> String {
        truncate_string(&self.sanitization.sanitize(sql), LOGGED_SQL_LEN)
    }

    /// Run SQL without a model and return the raw outcome.
    pub async fn execute(&self, sql: impl Into<String>) -> Result<QueryOutcome, Error> {
        let request = QueryRequest::<Unmodeled>::new(sql);
        match self.run(request).await {
            Ok(Materialized::Raw(outcome)) => Ok(outcome),
            Ok(_) => Err(Error::Model("raw query produced models".into())),
            Err(failure) => Err(failure.error),
        }
    }

    /// Run a row-returning statement and map the rows into plain structs.
    ///
    /// No model lifecycle is involved; each row goes through [`FromRow`].
    pub async fn fetch_as<T: FromRow>(&self, sql: impl Into<String>) -> Result<Vec<T>, Error> {
        let outcome = self.execute(sql).await?;
        let rows = outcome
            .rows
            .into_iter()
            .map(Ok)
            .map_rows::<T>()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Run a row-returning statement and build every row into `M`.
    pub async fn find_all<M: Model>(&self, sql: impl Into<String>) -> Result<Vec<M>, Error> {
        let request = QueryRequest::new(sql).factory();
        self.run(request)
            .await
            .map(Materialized::into_models)
            .map_err(Failure::into_error)
    }

    /// Run a row-returning statement and build its first row into `M`.
    pub async fn find<M: Model>(&self, sql: impl Into<String>) -> Result<Option<M>, Error> {
        let request = QueryRequest::new(sql)
            .factory()
            .options(QueryOptions::new().plain(true));
        match self.run(request).await.map_err(Failure::into_error)? {
            Materialized::One(model) => Ok(model),
            other => Ok(other.into_models().into_iter().next()),
        }
    }

    /// Compile a select on `M`'s table and build the rows.
    ///
    /// With an eager-load plan in `options`, the plan is passed on to
    /// [`Model::build`].
    pub async fn select<M: Model>(&self, options: &SelectOptions<'_>) -> Result<Vec<M>, Error> {
        let sql = tabula_sql::select(M::table_name(), options)?;
        let mut query_options = QueryOptions::new();
        if let Some(plan) = options.fill_plan {
            query_options = query_options.fill_plan(Arc::new(plan.clone()));
        }
        let request = QueryRequest::new(sql).factory().options(query_options);
        self.run(request)
            .await
            .map(Materialized::into_models)
            .map_err(Failure::into_error)
    }

    /// Insert a new instance or update an existing one.
    pub async fn save<M: Model>(&self, model: M) -> Result<M, Failure<M>> {
        self.save_with(model, &SaveOptions::default()).await
    }

    /// [`save`](Self::save) with insert flags.
    pub async fn save_with<M: Model>(&self, model: M, options: &SaveOptions) -> Result<M, Failure<M>> {
        let values = model.attributes();
        let sql = match compile_save(&model, &values, options) {
            Ok(sql) => sql,
            Err(e) => return Err(Failure::with_subject(e, Some(model))),
        };

        let request = QueryRequest::new(sql).instance(model);
        match self.run(request).await? {
            Materialized::Subject(mut model) => {
                model.mark_persisted();
                Ok(model)
            }
            _ => Err(Failure::new(Error::Model("save lost its instance".into()))),
        }
    }

    /// Delete the instance's row.
    pub async fn destroy<M: Model>(&self, model: M) -> Result<M, Failure<M>> {
        let sql = match tabula_sql::delete(M::table_name(), &model.identifier(), None) {
            Ok(sql) => sql,
            Err(e) => return Err(Failure::with_subject(e, Some(model))),
        };

        let request = QueryRequest::new(sql).instance(model);
        match self.run(request).await? {
            Materialized::Subject(model) => Ok(model),
            _ => Err(Failure::new(Error::Model("destroy lost its instance".into()))),
        }
    }
}

fn compile_save<M: Model>(
    model: &M,
    values: &IndexMap<String, tabula_types::SqlValue>,
    options: &SaveOptions,
) -> Result<String, Error> {
    if model.is_new_record() {
        let keys: Option<Vec<&str>> = options
            .upsert_keys
            .as_ref()
            .map(|keys| keys.iter().map(String::as_str).collect());
        Ok(tabula_sql::insert(
            M::table_name(),
            values,
            options.ignore_duplicates,
            keys.as_deref(),
        )?)
    } else {
        Ok(tabula_sql::update(M::table_name(), values, &model.identifier())?)
    }
}

/// Turn a successful outcome into the shape the request asked for.
fn materialize<M: Model>(
    request: QueryRequest<M>,
    operation: &str,
    outcome: QueryOutcome,
) -> Result<Materialized<M>, Failure<M>> {
    let build = operation == "SELECT" || request.options.build_results;
    let plan = request.options.fill_plan.clone();
    let plain = request.options.plain;

    let mut callee = request.callee;
    if let Some(Callee::Instance(subject)) = callee.as_mut() {
        if operation == "INSERT" && M::auto_increment_field().is_some() {
            if let Some(id) = outcome.last_insert_id {
                subject.set_auto_increment_id(id);
            }
        }
    }

    match callee {
        Some(_) if build => {
            let options = BuildOptions {
                is_new_record: false,
            };
            let built = outcome
                .rows
                .iter()
                .map(|row| M::build(row, options, plan.as_deref()))
                .collect::<Result<Vec<_>, _>>();

            match built {
                Ok(models) if plain => Ok(Materialized::One(models.into_iter().next())),
                Ok(models) => Ok(Materialized::Many(models)),
                Err(e) => Err(Failure::with_subject(e, subject_of(callee))),
            }
        }
        Some(Callee::Instance(subject)) => Ok(Materialized::Subject(subject)),
        _ => Ok(Materialized::Raw(outcome)),
    }
}

fn subject_of<M>(callee: Option<Callee<M>>) -> Option<M> {
    match callee {
        Some(Callee::Instance(subject)) => Some(subject),
        _ => None,
    }
}

/// Stand-in model for requests that never build rows.
#[derive(Debug)]
enum Unmodeled {}

impl Model for Unmodeled {
    fn table_name() -> &'static str {
        ""
    }

    fn build(
        _row: &tabula_client::Row,
        _options: BuildOptions,
        _fill_plan: Option<&JoinPlanNode>,
    ) -> crate::error::Result<Self> {
        Err(Error::Model("raw queries do not build models".into()))
    }

    fn attributes(&self) -> IndexMap<String, tabula_types::SqlValue> {
        match *self {}
    }

    fn identifier(&self) -> tabula_sql::Filter {
        match *self {}
    }

    fn is_new_record(&self) -> bool {
        match *self {}
    }

    fn mark_persisted(&mut self) {
        match *self {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tabula_client::Row;
    use tabula_sql::Filter;
    use tabula_types::SqlValue;

    #[derive(Debug, Default)]
    struct Counter {
        id: Option<u64>,
    }

    impl Model for Counter {
        fn table_name() -> &'static str {
            "counters"
        }

        fn build(
            row: &Row,
            _options: BuildOptions,
            _fill_plan: Option<&JoinPlanNode>,
        ) -> crate::error::Result<Self> {
            Ok(Self {
                id: Some(row.get_by_name("id")?),
            })
        }

        fn attributes(&self) -> IndexMap<String, SqlValue> {
            IndexMap::new()
        }

        fn identifier(&self) -> Filter {
            Filter::Id(0)
        }

        fn is_new_record(&self) -> bool {
            self.id.is_none()
        }

        fn auto_increment_field() -> Option<&'static str> {
            Some("id")
        }

        fn set_auto_increment_id(&mut self, id: u64) {
            self.id = Some(id);
        }

        fn mark_persisted(&mut self) {}
    }

    fn inserted_with_rows(rows: Vec<Row>, id: u64) -> QueryOutcome {
        let mut outcome = QueryOutcome::with_rows(Vec::<tabula_client::Column>::new(), rows);
        outcome.last_insert_id = Some(id);
        outcome
    }

    #[test]
    fn test_call_detection() {
        assert!(CALL_STATEMENT.is_match("CALL refresh()"));
        assert!(CALL_STATEMENT.is_match("  call refresh()"));
        assert!(!CALL_STATEMENT.is_match("SELECT 'call'"));
        assert!(!CALL_STATEMENT.is_match("callback()"));
    }

    #[test]
    fn test_default_options() {
        let options = QueryOptions::default();
        assert!(options.logging);
        assert!(!options.plain);
        assert!(!options.build_results);
        assert!(options.fill_plan.is_none());
    }

    #[test]
    fn test_materialized_into_models() {
        assert_eq!(Materialized::Many(vec![1, 2]).into_models(), vec![1, 2]);
        assert_eq!(Materialized::One(Some(3)).into_models(), vec![3]);
        assert!(Materialized::<i32>::One(None).into_models().is_empty());
        assert!(Materialized::<i32>::Raw(QueryOutcome::default()).into_models().is_empty());
    }

    #[test]
    fn test_insert_backfills_before_building_results() {
        let request = QueryRequest::new("INSERT INTO `counters` () VALUES ();")
            .instance(Counter::default())
            .options(QueryOptions::new().build_results(true));
        // A row without an `id` column makes the build fail, which hands the
        // instance back.
        let rows = vec![Row::from_pairs([("total", SqlValue::Int(1))])];

        let failure = materialize(request, "INSERT", inserted_with_rows(rows, 42)).unwrap_err();
        assert_eq!(failure.subject.unwrap().id, Some(42));
    }

    #[test]
    fn test_insert_with_build_results_builds_rows() {
        let request = QueryRequest::new("INSERT INTO `counters` () VALUES ();")
            .instance(Counter::default())
            .options(QueryOptions::new().build_results(true));
        let rows = vec![Row::from_pairs([("id", SqlValue::Int(7))])];

        let models = materialize(request, "INSERT", inserted_with_rows(rows, 7))
            .unwrap()
            .into_models();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, Some(7));
    }
}
