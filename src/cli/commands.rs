use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "converge-chain")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createwallet", about = "Create a new wallet")]
    Createwallet,
    #[command(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[command(
        name = "getbalance",
        about = "Get the ledger balance of the target address"
    )]
    GetBalance {
        #[arg(help = "The wallet address")]
        address: String,
    },
    #[command(name = "history", about = "Print all transactions touching an address")]
    History {
        #[arg(help = "The wallet address")]
        address: String,
    },
    #[command(name = "send", about = "Sign and submit a transaction")]
    Send {
        #[arg(help = "Source wallet address (must be in the local wallet file)")]
        from: String,
        #[arg(help = "Destination wallet address")]
        to: String,
        #[arg(help = "Amount to send")]
        amount: f64,
        #[arg(long, default_value_t = 0.0, help = "Miner fee attached to the transaction")]
        fee: f64,
        #[arg(long, help = "Mine a block immediately after submitting")]
        mine: bool,
    },
    #[command(name = "mine", about = "Mine one block to the given reward address")]
    Mine {
        #[arg(help = "Address to receive the block reward and fees")]
        address: String,
    },
    #[command(name = "printchain", about = "Print all blocks in the chain")]
    Printchain,
    #[command(name = "mempool", about = "Print pending transactions")]
    Mempool,
    #[command(
        name = "difficulty",
        about = "Show current difficulty, reward, and next halving height"
    )]
    Difficulty,
    #[command(name = "validate", about = "Validate the local chain end to end")]
    Validate,
    #[command(name = "startnode", about = "Start a node, serving peers over TCP")]
    StartNode {
        #[arg(help = "Enable mining mode and send rewards to ADDRESS")]
        miner: Option<String>,
    },
}
