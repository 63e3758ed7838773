use clap::Parser;

/// This is an election tabulation program: STV, Borda, Condorcet, party-list
/// PR, MMP and parallel voting.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The file containing the election description in JSON format.
    /// For more information about the file format, read the documentation of
    /// the `manual` module of the electoral_systems crate.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference file containing the outcome of an election in JSON format. If provided, elecsim will
    /// check that the tabulated output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the election will be written in JSON format to the given
    /// location. By default, it is printed to the standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) If specified, the ballots are read from this CSV file instead of the
    /// ballot sources of the configuration. The layout of the first ballot source, if any, is kept.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (stv, borda, condorcet, partyList, mmp, parallel or empty) If specified, overrides the method of the configuration.
    #[clap(short, long, value_parser)]
    pub method: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
