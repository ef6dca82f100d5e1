mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    ContactChanges, ContentChanges, cmd_contact_set, cmd_contact_show, cmd_content_add_service,
    cmd_content_remove_service, cmd_content_set, cmd_content_show, cmd_login, cmd_logout,
    cmd_meal_plan_create, cmd_meal_plan_delete, cmd_meal_plan_list, cmd_meal_plan_show,
    cmd_plan_create, cmd_plan_delete, cmd_plan_duplicate, cmd_plan_list, cmd_plan_next_week,
    cmd_plan_show, cmd_setup_admin, cmd_testimonial_add, cmd_testimonial_delete,
    cmd_testimonial_list, cmd_user_add, cmd_user_delete, cmd_user_list, cmd_user_update,
    cmd_video_add, cmd_video_delete, cmd_video_list, cmd_weight_delete, cmd_weight_history,
    cmd_weight_import, cmd_weight_log, cmd_whoami, json_error, parse_date, password_or_prompt,
};
use crate::config::Config;
use phinpt_core::auth::{AuthGate, FileSlot};
use phinpt_core::error::is_not_found;
use phinpt_core::models::{NewTestimonial, NewUser, Role, UpdateUser};
use phinpt_core::service::TrainerService;

#[derive(Parser)]
#[command(
    name = "phinpt",
    version,
    about = "Run a personal-training business: clients, plans, progress and the public site"
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the first admin account
    SetupAdmin {
        /// Admin username
        username: String,
        /// Admin email address
        #[arg(long)]
        email: String,
        /// Password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign in and remember the session
    Login {
        /// Username or email
        identifier: String,
        /// Password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the remembered session
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Manage accounts (admin)
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Manage workout plans
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Manage meal plans
    MealPlan {
        #[command(subcommand)]
        command: MealPlanCommands,
    },
    /// Track body weight
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Manage client testimonials
    Testimonial {
        #[command(subcommand)]
        command: TestimonialCommands,
    },
    /// Manage the video library
    Video {
        #[command(subcommand)]
        command: VideoCommands,
    },
    /// Show or edit the contact details
    Contact {
        #[command(subcommand)]
        command: ContactCommands,
    },
    /// Show or edit the home page content
    Content {
        #[command(subcommand)]
        command: ContentCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create an account
    Add {
        /// Login name (letters, digits, '.', '_' or '-')
        username: String,
        #[arg(long)]
        email: String,
        /// Full name
        #[arg(long)]
        name: String,
        /// Password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// admin or client
        #[arg(long, default_value = "client")]
        role: String,
        /// Avatar image URL
        #[arg(long)]
        avatar: Option<String>,
        /// Training start date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,
    },
    /// List accounts
    List,
    /// Change account fields. Pass an empty string to clear phone or avatar.
    Update {
        /// User id, username or email
        user: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
        /// Training start date (YYYY-MM-DD, empty to clear)
        #[arg(long)]
        start_date: Option<String>,
        /// New password
        #[arg(long)]
        password: Option<String>,
    },
    /// Delete an account with its plans and weight history
    Delete {
        /// User id, username or email
        user: String,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// List workout plans
    List {
        /// Only this client's plans (admin)
        #[arg(long)]
        client: Option<String>,
    },
    /// Show a plan day by day
    Show {
        /// Plan ID
        id: String,
    },
    /// Create a plan from a JSON file
    Create {
        /// Path to the plan JSON
        file: PathBuf,
        /// Client to assign it to (overrides the file's client_id)
        #[arg(long)]
        client: Option<String>,
    },
    /// Delete a plan with all its days, exercises and sets
    Delete {
        /// Plan ID
        id: String,
    },
    /// Copy a plan to another client as a fresh week 1
    Duplicate {
        /// Plan ID to copy
        id: String,
        /// Client receiving the copy
        #[arg(long)]
        client: String,
    },
    /// Start the next week from an existing plan
    NextWeek {
        /// Plan ID to use as the template
        id: String,
    },
}

#[derive(Subcommand)]
enum MealPlanCommands {
    /// List meal plans
    List {
        /// Only this client's plans (admin)
        #[arg(long)]
        client: Option<String>,
    },
    /// Show a meal plan meal by meal
    Show {
        /// Meal plan ID
        id: String,
    },
    /// Create a meal plan from a JSON file
    Create {
        /// Path to the meal plan JSON
        file: PathBuf,
        /// Client to assign it to (overrides the file's client_id)
        #[arg(long)]
        client: Option<String>,
    },
    /// Delete a meal plan
    Delete {
        /// Meal plan ID
        id: String,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Log a weight record
    Log {
        /// Weight value (number)
        value: f64,
        /// Unit: kg or lbs (default: kg)
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Optional notes
        #[arg(long)]
        notes: Option<String>,
        /// Client to log for (admin only)
        #[arg(long)]
        client: Option<String>,
    },
    /// Show weight history, newest first
    History {
        /// Client to show (admin; clients always see their own)
        #[arg(long)]
        client: Option<String>,
        /// Show at most N records
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Delete a weight record by ID
    Delete {
        /// Weight record ID
        id: String,
    },
    /// Import weigh-ins from a CSV file (Date,Weight[,Notes])
    Import {
        /// Path to the CSV file
        file: PathBuf,
        /// Client the records belong to
        #[arg(long)]
        client: String,
        /// Preview without writing anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum TestimonialCommands {
    /// Add a testimonial
    Add {
        /// Client name as shown on the site
        #[arg(long)]
        name: String,
        /// What the client said
        #[arg(long)]
        content: String,
        /// Star rating, 1-5
        #[arg(long, default_value = "5")]
        rating: i64,
        #[arg(long)]
        avatar: Option<String>,
        /// Before photo URL
        #[arg(long)]
        before: Option<String>,
        /// After photo URL
        #[arg(long)]
        after: Option<String>,
    },
    /// List testimonials
    List,
    /// Delete a testimonial
    Delete {
        /// Testimonial ID
        id: String,
    },
}

#[derive(Subcommand)]
enum VideoCommands {
    /// Add a `YouTube` video
    Add {
        /// Video title
        title: String,
        /// `YouTube` URL or 11-character video id
        url: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// List videos
    List {
        /// Only videos in this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Delete a video
    Delete {
        /// Video ID
        id: String,
    },
}

#[derive(Subcommand)]
enum ContactCommands {
    /// Show contact details
    Show,
    /// Change contact details
    Set {
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Facebook page URL
        #[arg(long)]
        facebook: Option<String>,
        /// Zalo link
        #[arg(long)]
        zalo: Option<String>,
    },
}

#[derive(Subcommand)]
enum ContentCommands {
    /// Show home page content
    Show,
    /// Change home page text. An empty image URL removes the image.
    Set {
        #[arg(long)]
        hero_title: Option<String>,
        #[arg(long)]
        hero_subtitle: Option<String>,
        #[arg(long)]
        hero_image: Option<String>,
        #[arg(long)]
        about_text: Option<String>,
        #[arg(long)]
        about_image: Option<String>,
        #[arg(long)]
        services_title: Option<String>,
    },
    /// Append a service to the list
    AddService {
        /// Service description
        text: String,
    },
    /// Remove a service by its number in `content show`
    RemoveService {
        /// 1-based service number
        number: usize,
    },
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// `Some("")` clears a nullable field.
fn clearable(value: Option<String>) -> Option<Option<String>> {
    value.map(|v| {
        let v = v.trim().to_string();
        (!v.is_empty()).then_some(v)
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli).await {
        if json {
            println!("{}", json_error(&format!("{e:#}")));
        } else {
            eprintln!("Error: {e:#}");
        }
        process::exit(if is_not_found(&e) { 2 } else { 1 });
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    if matches!(cli.command, Commands::Serve { .. }) {
        init_tracing("phinpt=info,phinpt_core=info,tower_http=info");
    } else {
        init_tracing("phinpt=warn,phinpt_core=warn");
    }

    let config = Config::load()?;
    let mut service = TrainerService::new(&config.db_path)?;
    let mut gate = AuthGate::restore(FileSlot::new(config.session_path()));
    gate.revalidate(service.db())?;
    let json = cli.json;

    match cli.command {
        Commands::SetupAdmin {
            username,
            email,
            password,
        } => cmd_setup_admin(&mut service, &username, &email, password, json),
        Commands::Login {
            identifier,
            password,
        } => cmd_login(&service, &mut gate, &identifier, password, json),
        Commands::Logout => cmd_logout(&mut gate, json),
        Commands::Whoami => cmd_whoami(&gate, json),
        Commands::Serve { port, bind } => server::start_server(service, &bind, port).await,
        Commands::User { command } => match command {
            UserCommands::Add {
                username,
                email,
                name,
                password,
                phone,
                role,
                avatar,
                start_date,
            } => {
                let user = NewUser {
                    username,
                    email,
                    password: password_or_prompt(password)?,
                    full_name: name,
                    phone,
                    role: role.parse::<Role>()?,
                    avatar,
                    start_date: start_date.map(Some).map(parse_date).transpose()?,
                };
                cmd_user_add(&mut service, &gate, &user, json)
            }
            UserCommands::List => cmd_user_list(&mut service, &gate, json),
            UserCommands::Update {
                user,
                username,
                email,
                name,
                phone,
                role,
                avatar,
                start_date,
                password,
            } => {
                let start_date = match clearable(start_date) {
                    Some(Some(d)) => Some(Some(parse_date(Some(d))?)),
                    Some(None) => Some(None),
                    None => None,
                };
                let update = UpdateUser {
                    username,
                    email,
                    full_name: name,
                    phone: clearable(phone),
                    role: role.as_deref().map(str::parse::<Role>).transpose()?,
                    avatar: clearable(avatar),
                    start_date,
                    password,
                };
                cmd_user_update(&mut service, &gate, &user, &update, json)
            }
            UserCommands::Delete { user } => cmd_user_delete(&mut service, &gate, &user, json),
        },
        Commands::Plan { command } => match command {
            PlanCommands::List { client } => {
                cmd_plan_list(&mut service, &gate, client.as_deref(), json)
            }
            PlanCommands::Show { id } => cmd_plan_show(&service, &gate, &id, json),
            PlanCommands::Create { file, client } => {
                cmd_plan_create(&mut service, &gate, &file, client.as_deref(), json)
            }
            PlanCommands::Delete { id } => cmd_plan_delete(&mut service, &gate, &id, json),
            PlanCommands::Duplicate { id, client } => {
                cmd_plan_duplicate(&mut service, &gate, &id, &client, json)
            }
            PlanCommands::NextWeek { id } => cmd_plan_next_week(&mut service, &gate, &id, json),
        },
        Commands::MealPlan { command } => match command {
            MealPlanCommands::List { client } => {
                cmd_meal_plan_list(&mut service, &gate, client.as_deref(), json)
            }
            MealPlanCommands::Show { id } => cmd_meal_plan_show(&service, &gate, &id, json),
            MealPlanCommands::Create { file, client } => {
                cmd_meal_plan_create(&mut service, &gate, &file, client.as_deref(), json)
            }
            MealPlanCommands::Delete { id } => {
                cmd_meal_plan_delete(&mut service, &gate, &id, json)
            }
        },
        Commands::Weight { command } => match command {
            WeightCommands::Log {
                value,
                unit,
                date,
                notes,
                client,
            } => cmd_weight_log(
                &mut service,
                &gate,
                value,
                &unit,
                date,
                notes,
                client.as_deref(),
                json,
            ),
            WeightCommands::History { client, limit } => {
                cmd_weight_history(&mut service, &gate, client.as_deref(), limit, json)
            }
            WeightCommands::Delete { id } => cmd_weight_delete(&mut service, &gate, &id, json),
            WeightCommands::Import {
                file,
                client,
                dry_run,
            } => cmd_weight_import(&mut service, &gate, &file, &client, dry_run, json),
        },
        Commands::Testimonial { command } => match command {
            TestimonialCommands::Add {
                name,
                content,
                rating,
                avatar,
                before,
                after,
            } => {
                let testimonial = NewTestimonial {
                    name,
                    content,
                    rating,
                    avatar,
                    before_image: before,
                    after_image: after,
                };
                cmd_testimonial_add(&mut service, &gate, &testimonial, json)
            }
            TestimonialCommands::List => cmd_testimonial_list(&mut service, json),
            TestimonialCommands::Delete { id } => {
                cmd_testimonial_delete(&mut service, &gate, &id, json)
            }
        },
        Commands::Video { command } => match command {
            VideoCommands::Add {
                title,
                url,
                description,
                category,
            } => cmd_video_add(&mut service, &gate, &title, &url, description, category, json),
            VideoCommands::List { category } => {
                cmd_video_list(&mut service, category.as_deref(), json)
            }
            VideoCommands::Delete { id } => cmd_video_delete(&mut service, &gate, &id, json),
        },
        Commands::Contact { command } => match command {
            ContactCommands::Show => cmd_contact_show(&mut service, json),
            ContactCommands::Set {
                phone,
                email,
                facebook,
                zalo,
            } => {
                let changes = ContactChanges {
                    phone,
                    email,
                    facebook,
                    zalo,
                };
                cmd_contact_set(&mut service, &gate, changes, json)
            }
        },
        Commands::Content { command } => match command {
            ContentCommands::Show => cmd_content_show(&mut service, json),
            ContentCommands::Set {
                hero_title,
                hero_subtitle,
                hero_image,
                about_text,
                about_image,
                services_title,
            } => {
                let changes = ContentChanges {
                    hero_title,
                    hero_subtitle,
                    hero_image,
                    about_text,
                    about_image,
                    services_title,
                };
                cmd_content_set(&mut service, &gate, changes, json)
            }
            ContentCommands::AddService { text } => {
                cmd_content_add_service(&mut service, &gate, &text, json)
            }
            ContentCommands::RemoveService { number } => {
                cmd_content_remove_service(&mut service, &gate, number, json)
            }
        },
    }
}
