use std::io::{Write, stdout};

use clap::Parser;
use lendsdk::{
    Address, Aggregator, AggregatorConfig, Annualization, Chain, MarketBoard, compound,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address of the Comptroller contract.
    #[arg(
        short,
        long,
        default_value = "0x3d9819210A31b4961b30EF54bE2aeD79B9c9Cd3B"
    )]
    comptroller: Address,
    /// RPC url
    #[arg(short, long, env = "RPC_URL", default_value = "http://127.0.0.1:8545")]
    rpc_url: String,
    /// Chain id, used for the blocks-per-year assumption.
    #[arg(long, default_value_t = 1)]
    chain_id: u64,
    /// Annualize with compounding instead of simple interest.
    #[arg(long)]
    compounding: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    simple_logger::init_with_level(log::Level::Info)?;

    let args = Cli::parse();
    let chain = Chain::from_id(args.chain_id)
        .ok_or_else(|| anyhow::anyhow!("unsupported chain id {}", args.chain_id))?;
    let annualization = if args.compounding {
        Annualization::Compounding
    } else {
        Annualization::Simple
    };

    println!("Connecting to {} via {}", chain, args.rpc_url);

    let client = compound::Client::with_url(&args.rpc_url, args.comptroller).await?;
    let config = AggregatorConfig::for_chain(chain).with_annualization(annualization);
    let aggregator = Aggregator::with_config(client.clone(), config);
    let board = MarketBoard::new();

    aggregator.refresh(&client, &board).await?;
    let Some(overview) = board.latest() else {
        anyhow::bail!("no market data");
    };

    println!("Market overview (pass {})", overview.generation);
    println!("Total supply: ${}", overview.totals.total_supply_usd.round_dp(2));
    println!("Total borrow: ${}", overview.totals.total_borrow_usd.round_dp(2));
    println!();

    let mut writer = tabwriter::TabWriter::new(stdout());
    writeln!(
        &mut writer,
        "asset\tname\ttotal supply\tsupply apy\ttotal borrow\tborrow apy"
    )?;
    for record in &overview.records {
        writeln!(
            &mut writer,
            "{}\t{}\t${}\t{:.2}%\t${}\t{:.2}%",
            record.token.symbol,
            record.token.name,
            record.total_supply_usd.round_dp(2),
            record.supply_apy,
            record.total_borrow_usd.round_dp(2),
            record.borrow_apy,
        )?;
    }
    writer.flush()?;

    for failure in &overview.failures {
        println!("skipped {}: {}", failure.market, failure.error);
    }

    Ok(())
}
