use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use session_tokens::{mint_token, verify_token, TokenConfig};
use shared::domain::UserId;

#[derive(Parser, Debug)]
struct Cli {
    /// Must match the server's `token_secret`.
    #[arg(long, default_value = "dev-secret")]
    secret: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints a bearer token for `user_id`.
    MintToken {
        user_id: String,
        #[arg(long, default_value_t = 86_400)]
        ttl_seconds: i64,
    },
    /// Prints the user a token was issued to.
    VerifyToken { token: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::MintToken {
            user_id,
            ttl_seconds,
        } => {
            let user_id = UserId::new(user_id);
            if user_id.is_blank() {
                anyhow::bail!("user id must not be blank");
            }
            let cfg = TokenConfig {
                secret: cli.secret,
                ttl_seconds,
            };
            let token = mint_token(&cfg, &user_id).context("failed to mint token")?;
            println!("{token}");
        }
        Command::VerifyToken { token } => {
            let cfg = TokenConfig {
                secret: cli.secret,
                ttl_seconds: 0,
            };
            let user_id = verify_token(&cfg, token.trim()).context("token did not verify")?;
            println!("user_id={user_id}");
        }
    }

    Ok(())
}
