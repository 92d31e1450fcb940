use std::{
    error::Error,
    io::{self, BufRead, Write},
};

use clap::Parser;
use sdsql::Command;
use sdsql::protocol::DbClient;
use sdsql::protocol::query::QueryResponse;

#[derive(Debug, Parser)]
struct Cli {
    /// Server address to connect to
    #[arg(long, default_value = "127.0.0.1:4399")]
    address: String,
    /// User to log in as
    #[arg(long, default_value = "admin")]
    user: String,
    /// Password for the user
    #[arg(long, default_value = "123456")]
    password: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let mut client = DbClient::connect(&cli.address)?;
    let user_id = client.login(&cli.user, &cli.password)?;
    println!("logged in as {} (user id {user_id})", cli.user);

    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();

    loop {
        let mut line = String::default();

        write!(&mut stdout, "sdsql> ")?;
        stdout.flush()?;

        if stdin.read_line(&mut line)? == 0 {
            break;
        }

        match line.trim() {
            "" => continue,
            ".exit" => break,
            ".ping" => match client.ping() {
                Ok(server_timestamp) => println!("pong (server time {server_timestamp})"),
                Err(e) => eprintln!("error: {e}"),
            },
            statement => match <&str as TryInto<Command>>::try_into(statement) {
                Ok(command) => match client.execute(command) {
                    Ok(response) => render(&mut stdout, &response)?,
                    Err(e) => eprintln!("error: {e}"),
                },
                Err(e) => eprintln!("error: {e}"),
            },
        }
    }

    Ok(())
}

/// Prints a result grid, or the failure message for unsuccessful queries.
fn render<W: Write>(out: &mut W, response: &QueryResponse) -> io::Result<()> {
    if !response.success {
        writeln!(out, "error: {}", response.error_message)?;
        return Ok(());
    }
    if response.column_names.is_empty() {
        writeln!(out, "ok")?;
        return Ok(());
    }

    writeln!(out, "{}", response.column_names.join(" | "))?;
    for row in &response.rows {
        writeln!(out, "{}", row.join(" | "))?;
    }
    writeln!(out, "({} row(s))", response.rows.len())?;
    Ok(())
}
