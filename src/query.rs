//! List query building: request query params -> filtered, sorted, projected,
//! paginated SQL over a [`Collection`].
//!
//! Each list endpoint describes its table once as a `Collection` whose
//! columns carry the public (camelCase) field name, the SQL expression
//! producing it, and its type. Only names found in the descriptor ever reach
//! the SQL text; every user supplied value is bound.
//!
//! ```text
//! GET /tours?difficulty=easy&price[lt]=1500&sort=-price&fields=name,price&page=2&limit=10
//! ```

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::{macros::format_description, Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const DEFAULT_SORT: &str = "-createdAt";
pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 70;

const RESERVED: [&str; 4] = ["sort", "fields", "page", "limit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Uuid,
    Text,
    Integer,
    Float,
    Bool,
    Timestamp,
    /// Arrays, JSON and computed sub-documents: projectable, never filterable.
    Opaque,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub field: &'static str,
    pub expr: &'static str,
    pub kind: ColumnKind,
    /// Internal columns are left out of the default projection.
    pub internal: bool,
}

impl Column {
    pub const fn new(field: &'static str, expr: &'static str, kind: ColumnKind) -> Self {
        Self {
            field,
            expr,
            kind,
            internal: false,
        }
    }

    pub const fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

#[derive(Debug)]
pub struct Collection {
    pub table: &'static str,
    pub columns: &'static [Column],
    /// Conditions applied to every query against the table.
    pub base_conditions: &'static [&'static str],
}

impl Collection {
    pub fn column(&self, field: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.field == field)
    }

    fn identity(&self) -> AppResult<&Column> {
        self.column("id")
            .ok_or_else(|| anyhow::anyhow!("collection {} has no id column", self.table).into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gte,
    Gt,
    Lte,
    Lt,
}

impl CompareOp {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "gte" => Some(CompareOp::Gte),
            "gt" => Some(CompareOp::Gt),
            "lte" => Some(CompareOp::Lte),
            "lt" => Some(CompareOp::Lt),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Gte => ">=",
            CompareOp::Gt => ">",
            CompareOp::Lte => "<=",
            CompareOp::Lt => "<",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: CompareOp,
    pub value: String,
    /// Set by server code; must resolve to a column.
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Default,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub page: i64,
    pub limit: i64,
    /// `false` drops LIMIT/OFFSET entirely.
    pub paged: bool,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            sort: parse_sort(DEFAULT_SORT),
            projection: Projection::Default,
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            paged: true,
        }
    }
}

impl ListQuery {
    /// filter -> sort -> project -> paginate, in that order.
    pub fn from_params(params: &HashMap<String, String>) -> AppResult<Self> {
        let get = |k: &str| params.get(k).map(String::as_str);
        Ok(Self::default()
            .filter(params)?
            .sort(get("sort"))
            .project(get("fields"))
            .paginate(get("page"), get("limit")))
    }

    /// Single document lookup by identity.
    pub fn by_id(id: Uuid) -> Self {
        Self::default().pinned("id", id).paginate(Some("1"), Some("1"))
    }

    pub fn filter(mut self, params: &HashMap<String, String>) -> AppResult<Self> {
        let mut parsed = Vec::new();
        for (key, value) in params {
            if RESERVED.contains(&key.as_str()) {
                continue;
            }
            let (field, op) = match key.split_once('[') {
                Some((field, rest)) => {
                    let raw_op = rest.strip_suffix(']').unwrap_or(rest);
                    let op = CompareOp::parse(raw_op).ok_or_else(|| {
                        AppError::Validation(format!("Unsupported operator '{raw_op}' on {field}"))
                    })?;
                    (field, op)
                }
                None => (key.as_str(), CompareOp::Eq),
            };
            parsed.push(Filter {
                field: field.to_string(),
                op,
                value: value.clone(),
                pinned: false,
            });
        }
        // HashMap order is random; keep the rendered SQL stable.
        parsed.sort_by(|a, b| (&a.field, a.op.sql()).cmp(&(&b.field, b.op.sql())));
        self.filters.extend(parsed);
        Ok(self)
    }

    pub fn pinned(mut self, field: &str, value: impl ToString) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: CompareOp::Eq,
            value: value.to_string(),
            pinned: true,
        });
        self
    }

    pub fn sort(mut self, raw: Option<&str>) -> Self {
        let keys = parse_sort(raw.unwrap_or(DEFAULT_SORT));
        self.sort = if keys.is_empty() {
            parse_sort(DEFAULT_SORT)
        } else {
            keys
        };
        self
    }

    pub fn project(mut self, raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            self.projection = Projection::Default;
            return self;
        };
        let names: Vec<&str> = split_list(raw).collect();
        let included: Vec<String> = names
            .iter()
            .filter(|n| !n.starts_with('-'))
            .map(|n| n.to_string())
            .collect();
        self.projection = if !included.is_empty() {
            Projection::Include(included)
        } else {
            let excluded: Vec<String> = names
                .iter()
                .filter_map(|n| n.strip_prefix('-'))
                .map(str::to_string)
                .collect();
            if excluded.is_empty() {
                Projection::Default
            } else {
                Projection::Exclude(excluded)
            }
        };
        self
    }

    pub fn paginate(mut self, page: Option<&str>, limit: Option<&str>) -> Self {
        self.page = positive_or(page, DEFAULT_PAGE);
        self.limit = positive_or(limit, DEFAULT_LIMIT);
        self
    }

    /// Every matching document, for embedding a full population.
    pub fn unbounded(mut self) -> Self {
        self.paged = false;
        self
    }

    pub fn skip(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Renders `SELECT jsonb_build_object(..) AS doc FROM .. WHERE .. ORDER BY .. LIMIT .. OFFSET ..`.
    pub fn render(&self, coll: &Collection) -> AppResult<QueryBuilder<'static, Postgres>> {
        let identity = coll.identity()?;
        let mut qb = QueryBuilder::new("SELECT jsonb_build_object(");
        for (i, col) in self.projected(coll, identity).into_iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(format_args!("'{}', {}", col.field, col.expr));
        }
        qb.push(format_args!(") AS doc FROM {}", coll.table));

        let mut first = true;
        let mut and = |qb: &mut QueryBuilder<'static, Postgres>| {
            qb.push(if first { " WHERE " } else { " AND " });
            first = false;
        };
        for cond in coll.base_conditions {
            and(&mut qb);
            qb.push(format_args!("({cond})"));
        }
        for filter in &self.filters {
            let column = match coll.column(&filter.field) {
                Some(c) if c.kind != ColumnKind::Opaque => c,
                _ if filter.pinned => {
                    return Err(anyhow::anyhow!(
                        "pinned filter {} is not filterable on {}",
                        filter.field,
                        coll.table
                    )
                    .into())
                }
                _ => continue,
            };
            let bound = Bound::parse(column, &filter.value)?;
            and(&mut qb);
            qb.push(format_args!("{} {} ", column.expr, filter.op.sql()));
            bound.push_into(&mut qb);
        }

        let mut order: Vec<String> = Vec::new();
        for key in &self.sort {
            let Some(column) = coll.column(&key.field) else {
                continue;
            };
            let dir = if key.descending { "DESC" } else { "ASC" };
            order.push(format!("{} {dir}", column.expr));
        }
        if !self.sort.iter().any(|k| k.field == identity.field) {
            order.push(format!("{} ASC", identity.expr));
        }
        qb.push(" ORDER BY ");
        qb.push(order.join(", "));

        if self.paged {
            qb.push(" LIMIT ");
            qb.push_bind(self.limit);
            qb.push(" OFFSET ");
            qb.push_bind(self.skip());
        }
        Ok(qb)
    }

    fn projected<'c>(&self, coll: &'c Collection, identity: &'c Column) -> Vec<&'c Column> {
        let mut out = vec![identity];
        match &self.projection {
            Projection::Default => out.extend(
                coll.columns
                    .iter()
                    .filter(|c| !c.internal && c.field != identity.field),
            ),
            Projection::Include(names) => {
                for name in names {
                    if let Some(col) = coll.column(name) {
                        if !out.iter().any(|c| c.field == col.field) {
                            out.push(col);
                        }
                    }
                }
            }
            Projection::Exclude(names) => out.extend(coll.columns.iter().filter(|c| {
                !c.internal && c.field != identity.field && !names.iter().any(|n| n == c.field)
            })),
        }
        out
    }
}

/// Runs a rendered list query and returns the projected documents.
pub async fn fetch_documents(
    db: &PgPool,
    coll: &Collection,
    query: &ListQuery,
) -> AppResult<Vec<Value>> {
    let mut qb = query.render(coll)?;
    let docs = qb.build_query_scalar::<Value>().fetch_all(db).await?;
    Ok(docs)
}

pub async fn fetch_document(db: &PgPool, coll: &Collection, id: Uuid) -> AppResult<Option<Value>> {
    let mut docs = fetch_documents(db, coll, &ListQuery::by_id(id)).await?;
    Ok(docs.pop())
}

/// `{status, results, data: {data}}` envelope for list endpoints.
#[derive(Debug, Serialize)]
pub struct ListData {
    pub data: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub status: &'static str,
    pub results: usize,
    pub data: ListData,
}

impl From<Vec<Value>> for ListResponse {
    fn from(docs: Vec<Value>) -> Self {
        Self {
            status: "success",
            results: docs.len(),
            data: ListData { data: docs },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocData {
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct DocResponse {
    pub status: &'static str,
    pub data: DocData,
}

impl From<Value> for DocResponse {
    fn from(doc: Value) -> Self {
        Self {
            status: "success",
            data: DocData { data: doc },
        }
    }
}

/// A filter value parsed according to its column type.
#[derive(Debug, Clone, PartialEq)]
enum Bound {
    Uuid(Uuid),
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Timestamp(OffsetDateTime),
}

impl Bound {
    fn parse(column: &Column, raw: &str) -> AppResult<Self> {
        let invalid = || AppError::Validation(format!("Invalid {}: {}", column.field, raw));
        let bound = match column.kind {
            ColumnKind::Uuid => Bound::Uuid(raw.parse().map_err(|_| invalid())?),
            ColumnKind::Text => Bound::Text(raw.to_string()),
            ColumnKind::Integer => Bound::Integer(raw.trim().parse().map_err(|_| invalid())?),
            ColumnKind::Float => Bound::Float(raw.trim().parse().map_err(|_| invalid())?),
            ColumnKind::Bool => Bound::Bool(raw.trim().parse().map_err(|_| invalid())?),
            ColumnKind::Timestamp => Bound::Timestamp(parse_timestamp(raw).ok_or_else(invalid)?),
            ColumnKind::Opaque => return Err(invalid()),
        };
        Ok(bound)
    }

    fn push_into(self, qb: &mut QueryBuilder<'static, Postgres>) {
        match self {
            Bound::Uuid(v) => qb.push_bind(v),
            Bound::Text(v) => qb.push_bind(v),
            Bound::Integer(v) => qb.push_bind(v),
            Bound::Float(v) => qb.push_bind(v),
            Bound::Bool(v) => qb.push_bind(v),
            Bound::Timestamp(v) => qb.push_bind(v),
        };
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339) {
        return Some(ts);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}

fn parse_sort(raw: &str) -> Vec<SortKey> {
    split_list(raw)
        .map(|name| match name.strip_prefix('-') {
            Some(field) => SortKey {
                field: field.to_string(),
                descending: true,
            },
            None => SortKey {
                field: name.trim_start_matches('+').to_string(),
                descending: false,
            },
        })
        .filter(|k| !k.field.is_empty())
        .collect()
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn positive_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDGETS: Collection = Collection {
        table: "widgets",
        columns: &[
            Column::new("id", "id", ColumnKind::Uuid),
            Column::new("name", "name", ColumnKind::Text),
            Column::new("price", "price", ColumnKind::Float),
            Column::new("duration", "duration", ColumnKind::Integer),
            Column::new("tags", "tags", ColumnKind::Opaque),
            Column::new("createdAt", "created_at", ColumnKind::Timestamp),
            Column::new("version", "version", ColumnKind::Integer).internal(),
        ],
        base_conditions: &["hidden = FALSE"],
    };

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn sql_for(pairs: &[(&str, &str)]) -> String {
        ListQuery::from_params(&params(pairs))
            .expect("params parse")
            .render(&WIDGETS)
            .expect("render")
            .sql()
            .to_string()
    }

    #[test]
    fn defaults_when_no_params() {
        let q = ListQuery::from_params(&HashMap::new()).unwrap();
        assert!(q.filters.is_empty());
        assert_eq!(
            q.sort,
            vec![SortKey {
                field: "createdAt".into(),
                descending: true
            }]
        );
        assert_eq!(q.projection, Projection::Default);
        assert_eq!((q.page, q.limit, q.skip()), (1, 70, 0));
    }

    #[test]
    fn reserved_keys_are_not_filters() {
        let q = ListQuery::from_params(&params(&[
            ("sort", "price"),
            ("fields", "name"),
            ("page", "2"),
            ("limit", "5"),
            ("name", "alpha"),
        ]))
        .unwrap();
        assert_eq!(q.filters.len(), 1);
        assert_eq!(q.filters[0].field, "name");
        assert_eq!(q.filters[0].op, CompareOp::Eq);
    }

    #[test]
    fn operator_suffixes_become_comparisons() {
        let sql = sql_for(&[("price[gte]", "100"), ("duration[lt]", "7")]);
        assert!(sql.contains("duration < $1"), "{sql}");
        assert!(sql.contains("price >= $2"), "{sql}");
        assert!(sql.contains("WHERE (hidden = FALSE) AND"), "{sql}");
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err = ListQuery::from_params(&params(&[("price[ne]", "5")])).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn unparsable_value_is_a_validation_error() {
        let q = ListQuery::from_params(&params(&[("price[gt]", "cheap")])).unwrap();
        let err = q.render(&WIDGETS).err().expect("render fails");
        assert!(matches!(err, AppError::Validation(m) if m.contains("price")));
    }

    #[test]
    fn unknown_and_opaque_fields_are_ignored_in_filters() {
        let sql = sql_for(&[("colour", "red"), ("tags", "x")]);
        assert!(!sql.contains("colour"));
        assert!(!sql.contains("tags ="));
    }

    #[test]
    fn timestamps_accept_plain_dates() {
        let sql = sql_for(&[("createdAt[gte]", "2021-03-01")]);
        assert!(sql.contains("created_at >= $1"), "{sql}");
        assert!(parse_timestamp("2021-03-01T10:00:00Z").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn sort_ascending_then_descending() {
        let sql = sql_for(&[("sort", "price,-duration")]);
        assert!(
            sql.contains("ORDER BY price ASC, duration DESC, id ASC"),
            "{sql}"
        );
    }

    #[test]
    fn default_sort_is_newest_first() {
        let sql = sql_for(&[]);
        assert!(sql.contains("ORDER BY created_at DESC, id ASC"), "{sql}");
    }

    #[test]
    fn sorting_by_id_does_not_repeat_tiebreaker() {
        let sql = sql_for(&[("sort", "-id")]);
        assert!(sql.contains("ORDER BY id DESC LIMIT"), "{sql}");
    }

    #[test]
    fn projection_keeps_identity_and_requested_fields() {
        let sql = sql_for(&[("fields", "name,price")]);
        assert!(
            sql.starts_with("SELECT jsonb_build_object('id', id, 'name', name, 'price', price) AS doc"),
            "{sql}"
        );
    }

    #[test]
    fn default_projection_hides_internal_columns() {
        let sql = sql_for(&[]);
        assert!(sql.contains("'createdAt', created_at"));
        assert!(!sql.contains("'version'"));
    }

    #[test]
    fn exclusion_projection_drops_fields() {
        let sql = sql_for(&[("fields", "-tags,-price")]);
        assert!(!sql.contains("'tags'"));
        assert!(!sql.contains("'price'"));
        assert!(sql.contains("'name', name"));
    }

    #[test]
    fn list_response_counts_results() {
        let res = ListResponse::from(vec![serde_json::json!({"id": 1}), serde_json::json!({"id": 2})]);
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["results"], 2);
        assert_eq!(json["data"]["data"][1]["id"], 2);
    }

    #[test]
    fn pagination_windows() {
        let q = ListQuery::default().paginate(Some("2"), Some("10"));
        assert_eq!((q.skip(), q.limit), (10, 10));
        let q = ListQuery::default().paginate(Some("0"), Some("abc"));
        assert_eq!((q.page, q.limit), (1, DEFAULT_LIMIT));
        // Far past the data is still just a window, never an error.
        let q = ListQuery::default().paginate(Some("9999"), Some("10"));
        assert_eq!(q.skip(), 99_980);
        assert!(q.render(&WIDGETS).is_ok());
    }

    #[test]
    fn limit_and_offset_are_bound_last() {
        let sql = sql_for(&[("name", "a")]);
        assert!(sql.ends_with("LIMIT $2 OFFSET $3"), "{sql}");
    }

    #[test]
    fn unbounded_queries_have_no_window() {
        let sql = ListQuery::default()
            .pinned("name", "a")
            .paginate(Some("3"), Some("5"))
            .unbounded()
            .render(&WIDGETS)
            .unwrap()
            .sql()
            .to_string();
        assert!(sql.ends_with("ORDER BY created_at DESC, id ASC"), "{sql}");
        assert!(!sql.contains("LIMIT"), "{sql}");
    }

    #[test]
    fn pinned_filters_must_resolve() {
        let err = ListQuery::default()
            .pinned("tags", "x")
            .render(&WIDGETS)
            .err()
            .expect("render fails");
        assert!(!err.is_operational());

        let sql = ListQuery::by_id(Uuid::nil()).render(&WIDGETS).unwrap().sql().to_string();
        assert!(sql.contains("AND id = $1"), "{sql}");
        assert!(sql.ends_with("LIMIT $2 OFFSET $3"), "{sql}");
    }
}
