pub(crate) mod sql_holders {
    pub(crate) const REPLACE: &str = include_str!("sql/holders/replace.sql");
    pub(crate) const DELETE: &str = include_str!("sql/holders/delete.sql");
    pub(crate) const SELECT_ALL: &str = include_str!("sql/holders/select_all.sql");
    pub(crate) const SELECT_BY_STATUS: &str = include_str!("sql/holders/select_by_status.sql");
    pub(crate) const COUNT_BY_STATUS: &str = include_str!("sql/holders/count_by_status.sql");
}
