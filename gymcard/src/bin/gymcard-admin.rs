//! Operator tool for the virtual membership card
//!
//! Opens the card persisted in the storage directory, selects the applet and
//! runs one host flow against it. Remote balance records are kept next to the
//! card state in `balances.json`.
//!
//! Usage: gymcard-admin [--storage-dir DIR] <command>

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::info;

use gymcard::card::{CardConfig, CardData, DateOfBirth};
use gymcard::crypto::{Pin, RsaOperations};
use gymcard::host::{BalanceSource, CardClient, JsonFileBalanceSource, RemoteCardData};
use gymcard::VirtualCard;

const BALANCES_FILE: &str = "balances.json";

#[derive(Parser)]
#[clap(name = "gymcard-admin", about = "Gym membership card administration")]
struct Cli {
    /// JSON card configuration
    #[clap(long)]
    config: Option<PathBuf>,

    /// Directory holding the card state (overrides the config file)
    #[clap(long)]
    storage_dir: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the card state and device key if missing
    Init,
    /// Show the plaintext part of the record
    Status,
    /// Personalize the card for a member
    Provision {
        #[clap(long)]
        user_id: u16,
        #[clap(long)]
        name: String,
        /// Date of birth as DD/MM/YYYY
        #[clap(long)]
        dob: String,
        #[clap(long, default_value_t = 0)]
        balance: i32,
        #[clap(long, default_value_t = 30)]
        expiry_days: i16,
        #[clap(long)]
        pin: Pin,
    },
    /// Verify the PIN and show the full record
    Show {
        #[clap(long)]
        pin: Pin,
    },
    TopUp {
        #[clap(long)]
        pin: Pin,
        amount: i32,
    },
    Purchase {
        #[clap(long)]
        pin: Pin,
        amount: i32,
    },
    ChangePin {
        #[clap(long)]
        old: Pin,
        #[clap(long)]
        new: Pin,
    },
    /// Restore the retry counter of a locked card
    Unlock,
    /// Set a new PIN and rebuild the record from the balance records
    ResetPin {
        #[clap(long)]
        new: Pin,
    },
    /// Blank the card and drop its balance record
    Erase,
    /// Challenge the card to prove it holds its device key
    Authenticate,
    /// Print the device public key as SPKI PEM
    ExportKey,
}

fn main() {
    env_logger::init();

    if let Err(e) = try_main() {
        log::error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn try_main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CardConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => CardConfig::default(),
    };
    if let Some(dir) = cli.storage_dir {
        config = config.with_storage_dir(dir);
    }

    let mut balances = JsonFileBalanceSource::new(config.storage_dir.join(BALANCES_FILE));
    let mut card = VirtualCard::new(&config).context("opening card")?;
    card.power_on();

    let mut client = CardClient::new(card);
    client.select(&config.aid).context("selecting membership applet")?;

    match cli.command {
        Commands::Init => {
            info!("Card state in {}", config.storage_dir.display());
            println!("Card ready in {}", config.storage_dir.display());
        }
        Commands::Status => {
            let data = client.read_public()?;
            if data.user_id == 0 {
                println!("Card is blank");
            } else {
                println!("User ID:   {}", data.user_id);
                println!("Name:      {}", data.full_name);
                println!("Born:      {}", data.dob);
            }
            println!("Retries:   {}", data.retry_counter);
            if data.is_locked() {
                println!("Card is LOCKED");
            }
        }
        Commands::Provision {
            user_id,
            name,
            dob,
            balance,
            expiry_days,
            pin,
        } => {
            if user_id == 0 {
                bail!("user id 0 is reserved for a blank card");
            }
            let member = CardData {
                user_id,
                balance,
                expiry_days,
                dob: parse_dob(&dob)?,
                full_name: name,
                ..CardData::default()
            };
            client.provision(&member, &pin)?;
            balances.push(user_id, &RemoteCardData::from(&member))?;
            println!("Provisioned user {}", user_id);
        }
        Commands::Show { pin } => print_member(&client.verify_pin(&pin)?),
        Commands::TopUp { pin, amount } => {
            let data = client.top_up(&pin, amount)?;
            balances.push(data.user_id, &RemoteCardData::from(&data))?;
            println!("Balance: {}", data.balance);
        }
        Commands::Purchase { pin, amount } => {
            let data = client.purchase(&pin, amount)?;
            balances.push(data.user_id, &RemoteCardData::from(&data))?;
            println!("Balance: {}", data.balance);
        }
        Commands::ChangePin { old, new } => {
            client.change_pin(&old, &new)?;
            println!("PIN changed");
        }
        Commands::Unlock => {
            client.admin_unlock()?;
            println!("Card unlocked");
        }
        Commands::ResetPin { new } => {
            client.admin_reset_pin(&new)?;
            let data = client.reprovision(&balances, &new)?;
            println!("PIN reset for user {}", data.user_id);
        }
        Commands::Erase => {
            let user_id = client.read_public()?.user_id;
            client.erase()?;
            if user_id != 0 {
                balances.delete(user_id)?;
            }
            println!("Card erased");
        }
        Commands::Authenticate => {
            client.authenticate_card()?;
            println!("Card authenticated");
        }
        Commands::ExportKey => {
            let key = client.get_public_key()?;
            print!("{}", RsaOperations::public_key_to_pem(&key)?);
        }
    }

    Ok(())
}

fn parse_dob(s: &str) -> anyhow::Result<DateOfBirth> {
    let parts: Vec<&str> = s.split('/').collect();
    let [day, month, year] = parts.as_slice() else {
        bail!("date of birth must be DD/MM/YYYY, got {:?}", s);
    };
    let day: u8 = day.parse().context("day")?;
    let month: u8 = month.parse().context("month")?;
    let year: u16 = year.parse().context("year")?;
    if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
        bail!("invalid date of birth {:?}", s);
    }
    Ok(DateOfBirth::new(day, month, year))
}

fn print_member(data: &CardData) {
    println!("User ID:   {}", data.user_id);
    println!("Name:      {}", data.full_name);
    println!("Born:      {}", data.dob);
    println!("Balance:   {}", data.balance);
    println!("Expires:   {} days ({})", data.expiry_days, data.membership_status());
    println!("Retries:   {}", data.retry_counter);
}
