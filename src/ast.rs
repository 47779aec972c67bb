//! Statement AST and a minimal line parser.
//!
//! SQL lexing/parsing proper is an external collaborator per spec.md
//! §1 and §6 — the executor only ever consumes the tagged statements
//! below and treats them as read-only. `parse_line` is a small,
//! line-oriented recognizer for the dialect's literal surface
//! (§4.7/§8's end-to-end scenarios), not a general SQL grammar: it
//! exists so the `giraffe` REPL has something to drive the executor
//! with.

use crate::error::{Error, Result};
use crate::heap::Schema;
use crate::value::{DataType, Row, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexType {
    BTree,
    Hash,
}

impl IndexType {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexType::BTree => "BTREE",
            IndexType::Hash => "HASH",
        }
    }
}

#[derive(Clone, Debug)]
pub enum Statement {
    CreateTable {
        table: String,
        columns: Schema,
        if_not_exists: bool,
    },
    CreateIndex {
        index: String,
        table: String,
        columns: Vec<String>,
        index_type: IndexType,
    },
    DropTable {
        table: String,
    },
    DropIndex {
        table: String,
        index: String,
    },
    ShowTables,
    ShowColumns {
        table: String,
    },
    ShowIndex {
        table: String,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Value>,
    },
    Delete {
        table: String,
        filter: Row,
    },
    Select {
        table: String,
        columns: Option<Vec<String>>,
        filter: Row,
    },
}

fn is_punct(c: char) -> bool {
    matches!(c, '(' | ')' | ',' | '=' | ';')
}

fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '\'' || c == '"' {
            let quote = c;
            chars.next();
            let mut buf = String::new();
            let mut closed = false;
            while let Some(&c2) = chars.peek() {
                chars.next();
                if c2 == quote {
                    closed = true;
                    break;
                }
                buf.push(c2);
            }
            if !closed {
                return Err(Error::SchemaError("unterminated string literal".into()));
            }
            tokens.push(format!("'{buf}'"));
            continue;
        }
        if is_punct(c) {
            tokens.push(c.to_string());
            chars.next();
            continue;
        }
        let mut buf = String::new();
        while let Some(&c2) = chars.peek() {
            if c2.is_whitespace() || is_punct(c2) || c2 == '\'' || c2 == '"' {
                break;
            }
            buf.push(c2);
            chars.next();
        }
        tokens.push(buf);
    }
    Ok(tokens)
}

fn is_string_literal(tok: &str) -> bool {
    tok.starts_with('\'') && tok.ends_with('\'') && tok.len() >= 2
}

fn parse_literal(tok: &str) -> Result<Value> {
    if is_string_literal(tok) {
        Ok(Value::Text(tok[1..tok.len() - 1].to_string()))
    } else if tok.eq_ignore_ascii_case("true") {
        Ok(Value::Bool(true))
    } else if tok.eq_ignore_ascii_case("false") {
        Ok(Value::Bool(false))
    } else {
        tok.parse::<i32>()
            .map(Value::Int)
            .map_err(|_| Error::SchemaError(format!("'{tok}' is not a valid literal")))
    }
}

/// Cursor over a tokenized line.
struct Tokens<'a> {
    items: &'a [String],
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn peek(&self) -> Option<&str> {
        self.items.get(self.pos).map(String::as_str)
    }

    fn peek_upper(&self) -> Option<String> {
        self.peek().map(|s| s.to_ascii_uppercase())
    }

    fn next(&mut self) -> Result<&'a str> {
        let tok = self
            .items
            .get(self.pos)
            .ok_or_else(|| Error::SchemaError("unexpected end of statement".into()))?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, keyword: &str) -> Result<()> {
        let tok = self.next()?;
        if tok.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(Error::SchemaError(format!(
                "expected '{keyword}', found '{tok}'"
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        Ok(self.next()?.to_string())
    }

    fn at_end(&self) -> bool {
        self.pos >= self.items.len()
    }
}

/// Parse `WHERE col = literal (AND col = literal)*`, having already
/// consumed the `WHERE` keyword.
fn parse_where(tokens: &mut Tokens) -> Result<Row> {
    let mut filter = Row::default();
    loop {
        let column = tokens.expect_ident()?;
        tokens.expect("=")?;
        let literal_tok = tokens.next()?;
        let value = parse_literal(literal_tok)?;
        filter.insert(column, value);
        match tokens.peek_upper() {
            Some(ref kw) if kw == "AND" => {
                tokens.next()?;
                continue;
            }
            _ => break,
        }
    }
    Ok(filter)
}

fn parse_optional_where(tokens: &mut Tokens) -> Result<Row> {
    if matches!(tokens.peek_upper(), Some(ref kw) if kw == "WHERE") {
        tokens.next()?;
        parse_where(tokens)
    } else {
        Ok(Row::default())
    }
}

fn parse_column_defs(tokens: &mut Tokens) -> Result<Schema> {
    tokens.expect("(")?;
    let mut columns = Vec::new();
    loop {
        let name = tokens.expect_ident()?;
        let type_name = tokens.expect_ident()?;
        columns.push((name, DataType::from_sql_name(&type_name)?));
        match tokens.next()? {
            "," => continue,
            ")" => break,
            other => {
                return Err(Error::SchemaError(format!(
                    "expected ',' or ')', found '{other}'"
                )))
            }
        }
    }
    Ok(columns)
}

fn parse_ident_list(tokens: &mut Tokens) -> Result<Vec<String>> {
    tokens.expect("(")?;
    let mut names = Vec::new();
    loop {
        names.push(tokens.expect_ident()?);
        match tokens.next()? {
            "," => continue,
            ")" => break,
            other => {
                return Err(Error::SchemaError(format!(
                    "expected ',' or ')', found '{other}'"
                )))
            }
        }
    }
    Ok(names)
}

fn parse_create(tokens: &mut Tokens) -> Result<Statement> {
    match tokens.peek_upper() {
        Some(ref kw) if kw == "TABLE" => {
            tokens.next()?;
            let mut if_not_exists = false;
            if matches!(tokens.peek_upper(), Some(ref kw) if kw == "IF") {
                tokens.next()?;
                tokens.expect("NOT")?;
                tokens.expect("EXISTS")?;
                if_not_exists = true;
            }
            let table = tokens.expect_ident()?;
            let columns = parse_column_defs(tokens)?;
            Ok(Statement::CreateTable {
                table,
                columns,
                if_not_exists,
            })
        }
        Some(ref kw) if kw == "INDEX" => {
            tokens.next()?;
            let index = tokens.expect_ident()?;
            tokens.expect("ON")?;
            let table = tokens.expect_ident()?;
            let columns = parse_ident_list(tokens)?;
            let index_type = if tokens.at_end() {
                IndexType::BTree
            } else {
                match tokens.next()?.to_ascii_uppercase().as_str() {
                    "BTREE" => IndexType::BTree,
                    "HASH" => IndexType::Hash,
                    other => {
                        return Err(Error::SchemaError(format!(
                            "unknown index type '{other}'"
                        )))
                    }
                }
            };
            Ok(Statement::CreateIndex {
                index,
                table,
                columns,
                index_type,
            })
        }
        _ => Err(Error::SchemaError(
            "expected TABLE or INDEX after CREATE".into(),
        )),
    }
}

fn parse_drop(tokens: &mut Tokens) -> Result<Statement> {
    match tokens.peek_upper() {
        Some(ref kw) if kw == "TABLE" => {
            tokens.next()?;
            Ok(Statement::DropTable {
                table: tokens.expect_ident()?,
            })
        }
        Some(ref kw) if kw == "INDEX" => {
            tokens.next()?;
            let qualified = tokens.expect_ident()?;
            let (table, index) = qualified
                .split_once('.')
                .map(|(t, i)| (t.to_string(), i.to_string()))
                .ok_or_else(|| {
                    Error::SchemaError("DROP INDEX expects table.index_name".into())
                })?;
            Ok(Statement::DropIndex { table, index })
        }
        _ => Err(Error::SchemaError(
            "expected TABLE or INDEX after DROP".into(),
        )),
    }
}

fn parse_show(tokens: &mut Tokens) -> Result<Statement> {
    match tokens.peek_upper() {
        Some(ref kw) if kw == "TABLES" => {
            tokens.next()?;
            Ok(Statement::ShowTables)
        }
        Some(ref kw) if kw == "COLUMNS" => {
            tokens.next()?;
            tokens.expect("FROM")?;
            Ok(Statement::ShowColumns {
                table: tokens.expect_ident()?,
            })
        }
        Some(ref kw) if kw == "INDEX" => {
            tokens.next()?;
            tokens.expect("FROM")?;
            Ok(Statement::ShowIndex {
                table: tokens.expect_ident()?,
            })
        }
        _ => Err(Error::SchemaError(
            "expected TABLES, COLUMNS or INDEX after SHOW".into(),
        )),
    }
}

fn parse_insert(tokens: &mut Tokens) -> Result<Statement> {
    tokens.expect("INTO")?;
    let table = tokens.expect_ident()?;
    let columns = parse_ident_list(tokens)?;
    tokens.expect("VALUES")?;
    tokens.expect("(")?;
    let mut values = Vec::new();
    loop {
        values.push(parse_literal(tokens.next()?)?);
        match tokens.next()? {
            "," => continue,
            ")" => break,
            other => {
                return Err(Error::SchemaError(format!(
                    "expected ',' or ')', found '{other}'"
                )))
            }
        }
    }
    if columns.len() != values.len() {
        return Err(Error::SchemaError(
            "column list and values list differ in length".into(),
        ));
    }
    Ok(Statement::Insert {
        table,
        columns,
        values,
    })
}

fn parse_delete(tokens: &mut Tokens) -> Result<Statement> {
    tokens.expect("FROM")?;
    let table = tokens.expect_ident()?;
    let filter = parse_optional_where(tokens)?;
    Ok(Statement::Delete { table, filter })
}

fn parse_select(tokens: &mut Tokens) -> Result<Statement> {
    let columns = if matches!(tokens.peek(), Some("*")) {
        tokens.next()?;
        None
    } else {
        let mut cols = vec![tokens.expect_ident()?];
        while matches!(tokens.peek(), Some(",")) {
            tokens.next()?;
            cols.push(tokens.expect_ident()?);
        }
        Some(cols)
    };
    tokens.expect("FROM")?;
    let table = tokens.expect_ident()?;
    let filter = parse_optional_where(tokens)?;
    Ok(Statement::Select {
        table,
        columns,
        filter,
    })
}

/// Parse one line of input into a [`Statement`]. A trailing `;` is
/// accepted and ignored.
pub fn parse_line(line: &str) -> Result<Statement> {
    let mut raw = tokenize(line)?;
    if matches!(raw.last().map(String::as_str), Some(";")) {
        raw.pop();
    }
    if raw.is_empty() {
        return Err(Error::SchemaError("empty statement".into()));
    }
    let mut tokens = Tokens {
        items: &raw,
        pos: 0,
    };
    let keyword = tokens.next()?.to_ascii_uppercase();
    let statement = match keyword.as_str() {
        "CREATE" => parse_create(&mut tokens),
        "DROP" => parse_drop(&mut tokens),
        "SHOW" => parse_show(&mut tokens),
        "INSERT" => parse_insert(&mut tokens),
        "DELETE" => parse_delete(&mut tokens),
        "SELECT" => parse_select(&mut tokens),
        other => Err(Error::SchemaError(format!("unknown statement '{other}'"))),
    }?;
    if !tokens.at_end() {
        return Err(Error::SchemaError("trailing tokens after statement".into()));
    }
    Ok(statement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_table() {
        let stmt = parse_line("CREATE TABLE foo (id INT, name TEXT)").unwrap();
        match stmt {
            Statement::CreateTable {
                table,
                columns,
                if_not_exists,
            } => {
                assert_eq!(table, "foo");
                assert_eq!(
                    columns,
                    vec![
                        ("id".to_string(), DataType::Int),
                        ("name".to_string(), DataType::Text)
                    ]
                );
                assert!(!if_not_exists);
            }
            _ => panic!("wrong statement kind"),
        }
    }

    #[test]
    fn parses_create_table_if_not_exists() {
        let stmt = parse_line("CREATE TABLE IF NOT EXISTS foo (id INT)").unwrap();
        assert!(matches!(
            stmt,
            Statement::CreateTable {
                if_not_exists: true,
                ..
            }
        ));
    }

    #[test]
    fn parses_select_with_where() {
        let stmt = parse_line("SELECT name FROM foo WHERE id = 2").unwrap();
        match stmt {
            Statement::Select {
                table,
                columns,
                filter,
            } => {
                assert_eq!(table, "foo");
                assert_eq!(columns, Some(vec!["name".to_string()]));
                assert_eq!(filter.get("id"), Some(&Value::Int(2)));
            }
            _ => panic!("wrong statement kind"),
        }
    }

    #[test]
    fn parses_insert_with_string_literal() {
        let stmt = parse_line("INSERT INTO foo (id, name) VALUES (1, 'a')").unwrap();
        match stmt {
            Statement::Insert {
                table,
                columns,
                values,
            } => {
                assert_eq!(table, "foo");
                assert_eq!(columns, vec!["id".to_string(), "name".to_string()]);
                assert_eq!(values, vec![Value::Int(1), Value::Text("a".to_string())]);
            }
            _ => panic!("wrong statement kind"),
        }
    }

    #[test]
    fn rejects_unknown_statement() {
        assert!(parse_line("FROBNICATE foo").is_err());
    }

    #[test]
    fn rejects_non_equality_where_shape() {
        assert!(parse_line("SELECT * FROM foo WHERE id > 2").is_err());
    }
}
