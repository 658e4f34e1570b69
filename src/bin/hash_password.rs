#![cfg(not(tarpaulin_include))]

use rdv_dashboard::login::hash_password;
use std::env;
use std::io::{self, BufRead};

/// Print the Argon2 hash of a password, ready for `password = "..."` in
/// `secrets.toml`. The password is read from the first argument, or from
/// the first line of stdin so it stays out of the shell history.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let password = match env::args().nth(1) {
        Some(password) => password,
        None => {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if password.is_empty() {
        eprintln!("Usage: hash_password <password>  (or pipe it on stdin)");
        return Ok(());
    }

    println!("{}", hash_password(&password)?);
    Ok(())
}
