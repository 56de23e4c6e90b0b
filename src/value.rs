#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    None,
    Int(i64),
    Float(f64),
    String(String),
    BitStr(String),
    Vec(Vec<Val>),
}
