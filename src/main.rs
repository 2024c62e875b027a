use std::process::ExitCode;

use clap::{Parser, Subcommand};

use practice_room_client::commands::{self, ClientError};
use practice_room_client::config::Config;
use practice_room_client::location::Coordinates;
use practice_room_client::session::AuthState;
use practice_room_client::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "practice-room", about = "Practice-room reservation client")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store the token pair issued by the login flow
    Login {
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        refresh_token: String,
    },
    /// Show the signed-in user's profile
    Whoami,
    /// List the signed-in user's reservations
    Records,
    /// Cancel a reservation
    Cancel { reservation_id: i64 },
    /// Check in to a reservation from the given position
    Verify {
        reservation_id: i64,
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
    },
    /// Log out and forget stored tokens
    Logout,
}

async fn run(state: &AppState, command: Command) -> Result<(), ClientError> {
    match command {
        Command::Login {
            access_token,
            refresh_token,
        } => {
            commands::store_tokens(state, &access_token, &refresh_token)?;
            println!("Tokens stored");
        }
        Command::Whoami => {
            let profile = commands::validate_token(state).await?;
            println!("{}", profile.user_id);
            for (key, value) in &profile.extra {
                println!("  {}: {}", key, value);
            }
        }
        Command::Records => {
            let profile = commands::validate_token(state).await?;
            let records = commands::fetch_records(state, &profile.user_id).await?;
            if records.is_empty() {
                println!("No reservations");
            }
            for record in records {
                let mut actions = Vec::new();
                if record.can_cancel() {
                    actions.push("cancel");
                }
                if record.can_verify() {
                    actions.push("verify");
                }
                println!(
                    "#{} room {} {} ~ {} [{:?}/{:?}] {}",
                    record.id,
                    record.room_id,
                    record.start_time,
                    record.end_time,
                    record.status,
                    record.location_status,
                    actions.join(",")
                );
            }
        }
        Command::Cancel { reservation_id } => {
            let message = commands::cancel_reservation(state, reservation_id).await?;
            println!("Cancelled: {}", message);
        }
        Command::Verify {
            reservation_id,
            latitude,
            longitude,
        } => {
            let position = Coordinates {
                latitude,
                longitude,
            };
            let (distance, message) =
                commands::verify_location(state, reservation_id, position).await?;
            println!("Verified at {:.1}m: {}", distance, message);
        }
        Command::Logout => {
            if commands::logout(state).await? {
                println!("Logged out");
            } else {
                println!("Not logged in");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    env_logger::init();

    let args = Args::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    log::debug!("Using API at {}", config.api_url);

    let state = AppState::new(&config);
    let auth_state = state.session.subscribe();

    let explicit_logout = matches!(args.command, Command::Logout);
    let result = run(&state, args.command).await;

    // Forced sign-outs surface here regardless of which command hit them.
    let signed_out =
        auth_state.has_changed().unwrap_or(false) && *auth_state.borrow() == AuthState::SignedOut;
    if signed_out && !explicit_logout {
        eprintln!("Session ended, run `practice-room login` again");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
