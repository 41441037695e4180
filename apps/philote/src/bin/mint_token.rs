//! Sign an access token for local testing.
//!
//! ```text
//! mint-token --read news,chat --write chat [--sub device-1] [--ttl 3600]
//! ```
//!
//! The secret comes from `JWT_SECRET` (a `.env` file is honoured).

use philote::auth::tokens::{mint_access_token, AccessClaims};

fn usage() -> ! {
    eprintln!("usage: mint-token [--read a,b] [--write a,b] [--sub id] [--ttl seconds]");
    std::process::exit(2);
}

fn channels(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn main() {
    let _ = dotenvy::dotenv();
    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        eprintln!("JWT_SECRET env var is required");
        std::process::exit(1);
    });

    let mut claims = AccessClaims::default();
    let mut args = std::env::args().skip(1);
    while let Some(flag) = args.next() {
        let value = args.next().unwrap_or_else(|| usage());
        match flag.as_str() {
            "--read" => claims.read = channels(&value),
            "--write" => claims.write = channels(&value),
            "--sub" => claims.sub = Some(value),
            "--ttl" => {
                let secs: i64 = value.parse().unwrap_or_else(|_| usage());
                claims.exp = Some((chrono::Utc::now() + chrono::Duration::seconds(secs)).timestamp());
            }
            _ => usage(),
        }
    }

    match mint_access_token(&secret, &claims) {
        Ok(token) => println!("{token}"),
        Err(e) => {
            eprintln!("failed to sign token: {e}");
            std::process::exit(1);
        }
    }
}
