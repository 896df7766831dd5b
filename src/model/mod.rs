crate::using! {
    pub record,
    pub query,
    pub sort,
}
