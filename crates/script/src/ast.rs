/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation (`!expr`).
    Not,
    /// Arithmetic negation (`-expr`).
    Neg,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical, short-circuit
    And,
    Or,
}

/// Injected objects a script may call methods on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// `logger.*` / `console.*`
    Logger,
    /// `http.*`
    Http,
}

/// One piece of a backtick template string.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Expr(Expr),
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Template(Vec<TemplatePart>),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    /// A local binding, or `ctx` / `context` for the context store.
    Ident(String),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// Builtin function call. Method calls on values compile to this with
    /// the receiver as the first argument.
    Call(String, Vec<Expr>),
    /// Method call on an injected capability.
    Invoke(Capability, String, Vec<Expr>),
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    /// The binary operator a compound assignment applies.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            Self::Set => None,
            Self::Add => Some(BinaryOp::Add),
            Self::Sub => Some(BinaryOp::Sub),
            Self::Mul => Some(BinaryOp::Mul),
            Self::Div => Some(BinaryOp::Div),
        }
    }
}

/// One step of an assignment target path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Field(String),
    Index(Expr),
}

/// Assignment target: a root name followed by field/index steps, e.g.
/// `ctx.user["id"]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub root: String,
    pub path: Vec<PathSegment>,
}

/// Statement tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let` / `var` (mutable) or `const` binding.
    Let {
        name: String,
        value: Expr,
        constant: bool,
    },
    Assign {
        place: Place,
        op: AssignOp,
        value: Expr,
    },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Block(Vec<Stmt>),
    Expr(Expr),
}

/// A parsed script.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}
