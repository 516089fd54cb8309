//! Walk through the driver against a small `users` table.
//!
//! Usage: `sqlite3-demo [TARGET]`, where `TARGET` is a path or a
//! `sqlite3://name?flags=N` URL. Defaults to an in-memory database.
//! Set `RUST_LOG=sqlite3_driver=debug` to see the driver's own logging.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use sqlite3_driver::drivers::sqlite;
use sqlite3_driver::{execute_directly, Connection, OpenFlags, OpenTarget, ResultCursor};

fn install_tracing_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

fn open(arg: Option<String>) -> Result<Connection> {
    let target = match arg {
        Some(arg) => {
            let mut target: OpenTarget = arg.parse().context("parsing open target")?;
            if target.flags == OpenFlags::empty() {
                target.flags = OpenFlags::READ_WRITE | OpenFlags::CREATE;
            }
            target
        }
        None => OpenTarget::in_memory(),
    };

    println!("About to connect to {}", target);
    Connection::open(&target).context("opening database")
}

fn main() -> Result<()> {
    install_tracing_subscriber();

    println!("About to query version");
    println!("{}", serde_json::to_string_pretty(&sqlite::version())?);

    let conn = open(std::env::args().nth(1))?;
    println!("connection: {:?}", conn);

    execute_directly(
        &conn,
        "CREATE TABLE IF NOT EXISTS users(name TEXT, password TEXT)",
        &[],
    )?;
    for name in ["alice", "bob", "carol", "dave"] {
        execute_directly(
            &conn,
            "INSERT INTO users(name, password) VALUES (?, ?)",
            &[name, "somepassword"],
        )?;
    }

    println!("About to prepare statement");
    let mut statement = conn.prepare("SELECT rowid, * FROM users WHERE password = ?")?;
    println!("statement: {:?}", statement);

    println!("About to execute query and fetch all results");
    if let Some(mut cursor) = conn.execute(&mut statement, &["somepassword"])? {
        println!("columns: {:?}", cursor.column_names());
        for row in cursor.fetch_all()? {
            println!("data: {:?}", row.values());
        }
        cursor.close()?;
    }

    println!("About to re-execute query and fetch row by row");
    if let Some(mut cursor) = conn.execute(&mut statement, &["somepassword"])? {
        println!("data: {:?}", cursor.fetch_one()?.values());
        println!("data: {:?}", cursor.fetch_named()?);
        for row in cursor.fetch_many(10)? {
            println!("data: {:?}", row.values());
        }
        println!("cursor: {:?}", cursor);
    }

    println!("About to stream the first two rows");
    if let Some(mut rows) = conn.stream(statement, &["somepassword"])? {
        for row in rows.by_ref().take(2) {
            println!("streamed: {:?}", row.values());
        }
        let cursor = rows.close()?;
        cursor.into_statement().close()?;
    }

    println!("About to execute directly");
    let rows = execute_directly(&conn, "SELECT count(*) FROM users", &[])?;
    println!("data: {:?}", rows);
    println!(
        "changes: {}, last rowid: {}",
        conn.changes(),
        conn.last_insert_rowid()
    );

    println!("About to close connection");
    conn.close()?;
    Ok(())
}
