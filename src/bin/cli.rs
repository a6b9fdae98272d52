use clap::{Parser, Subcommand};
use serde::Serialize;

use testboard::client::{ApiClient, ClientError, FileTokenStore, DEFAULT_API_URL, DEFAULT_TOKEN_FILE};
use testboard::models::{ProjectInput, TestInput};

#[derive(Parser)]
#[command(name = "testboard-cli")]
#[command(about = "CLI for the testboard API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, env = "TESTBOARD_API_URL", default_value = DEFAULT_API_URL)]
    url: String,

    /// File holding the session token between invocations
    #[arg(long, env = "TESTBOARD_TOKEN_FILE", default_value = DEFAULT_TOKEN_FILE)]
    token_file: String,
}

#[derive(Subcommand)]
enum Commands {
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    Logout,
    Ping,
    Projects,
    CreateProject {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        status: Option<String>,
    },
    UpdateProject {
        #[arg(short, long)]
        id: i64,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        status: Option<String>,
    },
    DeleteProject {
        #[arg(short, long)]
        id: i64,
    },
    Tests,
    CreateTest {
        #[arg(short, long)]
        name: String,
        /// pending, in-progress, completed or failed
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short = 'P', long)]
        project_id: Option<i64>,
        #[arg(short = 'U', long)]
        user_id: Option<i64>,
    },
    UpdateTest {
        #[arg(short, long)]
        id: i64,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short = 'P', long)]
        project_id: Option<i64>,
        #[arg(short = 'U', long)]
        user_id: Option<i64>,
        /// Remove the test's project reference
        #[arg(long, conflicts_with = "project_id")]
        unassign_project: bool,
        /// Remove the test's user reference
        #[arg(long, conflicts_with = "user_id")]
        unassign_user: bool,
    },
    DeleteTest {
        #[arg(short, long)]
        id: i64,
    },
    Stats,
    Monthly,
    ProjectProgress,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = ApiClient::new(cli.url, FileTokenStore::new(&cli.token_file));

    match cli.command {
        Commands::Login { username, password } => {
            client.login(&username, &password).await?;
            println!("Logged in. Token saved to {}", cli.token_file);
        }
        Commands::Logout => {
            client.logout()?;
            println!("Logged out (token removed).");
        }
        Commands::Ping => print_json(&client.ping().await?)?,
        Commands::Projects => print_json(&client.projects().await?)?,
        Commands::CreateProject { name, description, status } => {
            let input = ProjectInput {
                name: Some(name),
                description,
                status,
            };
            print_json(&client.create_project(&input).await?)?;
        }
        Commands::UpdateProject { id, name, description, status } => {
            let input = ProjectInput {
                name: Some(name),
                description,
                status,
            };
            print_json(&client.update_project(id, &input).await?)?;
        }
        Commands::DeleteProject { id } => print_json(&client.delete_project(id).await?)?,
        Commands::Tests => {
            let projects = client.projects().await?;
            for test in client.tests().await? {
                // Dangling project ids show up as the bare id.
                let project = match test.project_id {
                    Some(pid) => projects
                        .iter()
                        .find(|p| p.id == pid)
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| format!("#{}", pid)),
                    None => String::new(),
                };
                println!("{:>5}  {:<12} {:<24} {}", test.id, test.status, project, test.name);
            }
        }
        Commands::CreateTest { name, status, project_id, user_id } => {
            let input = TestInput {
                name: Some(name),
                status,
                project_id: project_id.map(Some),
                user_id: user_id.map(Some),
            };
            print_json(&client.create_test(&input).await?)?;
        }
        Commands::UpdateTest {
            id,
            name,
            status,
            project_id,
            user_id,
            unassign_project,
            unassign_user,
        } => {
            let input = TestInput {
                name: Some(name),
                status,
                project_id: if unassign_project { Some(None) } else { project_id.map(Some) },
                user_id: if unassign_user { Some(None) } else { user_id.map(Some) },
            };
            print_json(&client.update_test(id, &input).await?)?;
        }
        Commands::DeleteTest { id } => print_json(&client.delete_test(id).await?)?,
        Commands::Stats => print_json(&client.stats().await?)?,
        Commands::Monthly => print_json(&client.monthly_progress().await?)?,
        Commands::ProjectProgress => print_json(&client.project_progress().await?)?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        match err.downcast_ref::<ClientError>() {
            Some(ClientError::Unauthorized { message }) => {
                eprintln!("{}. Run `testboard-cli login` to start a new session.", message);
            }
            _ => eprintln!("Error: {:#}", err),
        }
        std::process::exit(1);
    }
}
