//! Recursive-descent expression grammar (§4.2), built with the `peg`
//! crate's inline `parser!` macro (see DESIGN.md for why this form was
//! chosen over a build.rs-generated module).

use super::ast::{BinOp, Expr, LogOp, MemberKey, UnOp};

peg::parser! {
    pub grammar expr_grammar() for str {
        rule _() = quiet!{[' ' | '\t' | '\r' | '\n']*}

        rule digits() = ['0'..='9']+

        rule number_lit() -> Expr
            = n:$(digits() ("." digits())? (['e' | 'E'] ['+' | '-']? digits())?)
              {? n.parse::<f64>().map(Expr::Number).or(Err("number")) }

        rule dq_char() -> char
            = "\\n" { '\n' }
            / "\\t" { '\t' }
            / "\\r" { '\r' }
            / "\\\\" { '\\' }
            / "\\\"" { '"' }
            / "\\'" { '\'' }
            / "\\" c:[_] { c }
            / !['"'] c:[_] { c }

        rule sq_char() -> char
            = "\\n" { '\n' }
            / "\\t" { '\t' }
            / "\\r" { '\r' }
            / "\\\\" { '\\' }
            / "\\\"" { '"' }
            / "\\'" { '\'' }
            / "\\" c:[_] { c }
            / !['\''] c:[_] { c }

        rule string_lit() -> Expr
            = "\"" s:dq_char()* "\"" { Expr::Str(s.into_iter().collect()) }
            / "'" s:sq_char()* "'" { Expr::Str(s.into_iter().collect()) }

        rule ident_start() = ['a'..='z' | 'A'..='Z' | '_']
        rule ident_continue() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']

        rule identifier() -> String
            = n:$(ident_start() ident_continue()*) { n.to_string() }

        rule keyword_boundary() = !ident_continue()

        rule array_lit() -> Expr
            = "[" _ items:(expr() ** (_ "," _)) _ "]" { Expr::ArrayLit(items) }

        rule call_args() -> Vec<Expr>
            = "(" _ args:(expr() ** (_ "," _)) _ ")" { args }

        rule primary() -> Expr
            = number_lit()
            / string_lit()
            / "true" keyword_boundary() { Expr::Bool(true) }
            / "false" keyword_boundary() { Expr::Bool(false) }
            / "null" keyword_boundary() { Expr::Null }
            / "__LINE__" keyword_boundary() { Expr::PseudoLine }
            / "__FILE__" keyword_boundary() { Expr::PseudoFile }
            / "defined" _ "(" _ name:identifier() _ ")" { Expr::Defined(name) }
            / name:identifier() _ args:call_args() { Expr::Call(name, args) }
            / array_lit()
            / "(" _ e:expr() _ ")" { e }
            / name:identifier() { Expr::Ident(name) }

        rule member_op() -> MemberKey
            = "." _ name:identifier() { MemberKey::Ident(name) }
            / "[" _ e:expr() _ "]" { MemberKey::Index(Box::new(e)) }

        rule postfix() -> Expr
            = base:primary() ops:(_ op:member_op() { op })* {
                ops.into_iter().fold(base, |acc, key| Expr::Member(Box::new(acc), key))
            }

        rule unary() -> Expr = precedence!{
            "+" _ e:(@) { Expr::Unary(UnOp::Pos, Box::new(e)) }
            "-" _ e:(@) { Expr::Unary(UnOp::Neg, Box::new(e)) }
            "!" _ e:(@) { Expr::Unary(UnOp::Not, Box::new(e)) }
            --
            e:postfix() { e }
        }

        rule binary() -> Expr = precedence!{
            x:(@) _ "||" _ y:@ { Expr::Logical(LogOp::Or, Box::new(x), Box::new(y)) }
            --
            x:(@) _ "&&" _ y:@ { Expr::Logical(LogOp::And, Box::new(x), Box::new(y)) }
            --
            x:(@) _ "==" _ y:@ { Expr::Binary(BinOp::Eq, Box::new(x), Box::new(y)) }
            x:(@) _ "!=" _ y:@ { Expr::Binary(BinOp::Ne, Box::new(x), Box::new(y)) }
            --
            x:(@) _ "<=" _ y:@ { Expr::Binary(BinOp::Le, Box::new(x), Box::new(y)) }
            x:(@) _ ">=" _ y:@ { Expr::Binary(BinOp::Ge, Box::new(x), Box::new(y)) }
            x:(@) _ "<" _ y:@ { Expr::Binary(BinOp::Lt, Box::new(x), Box::new(y)) }
            x:(@) _ ">" _ y:@ { Expr::Binary(BinOp::Gt, Box::new(x), Box::new(y)) }
            --
            x:(@) _ "+" _ y:@ { Expr::Binary(BinOp::Add, Box::new(x), Box::new(y)) }
            x:(@) _ "-" _ y:@ { Expr::Binary(BinOp::Sub, Box::new(x), Box::new(y)) }
            --
            x:(@) _ "*" _ y:@ { Expr::Binary(BinOp::Mul, Box::new(x), Box::new(y)) }
            x:(@) _ "/" _ y:@ { Expr::Binary(BinOp::Div, Box::new(x), Box::new(y)) }
            x:(@) _ "%" _ y:@ { Expr::Binary(BinOp::Mod, Box::new(x), Box::new(y)) }
            --
            e:unary() { e }
        }

        rule ternary() -> Expr
            = cond:binary() _ "?" _ t:ternary() _ ":" _ f:ternary() {
                Expr::Ternary(Box::new(cond), Box::new(t), Box::new(f))
            }
            / binary()

        pub rule expr() -> Expr = ternary()

        pub rule top_level() -> Expr = _ e:expr() _ { e }
    }
}
