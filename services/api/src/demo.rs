use beneficiary_fraud::clock::SystemClock;
use beneficiary_fraud::config::FeatureToggles;
use beneficiary_fraud::error::AppError;
use beneficiary_fraud::workflows::fraud::{
    EvaluationConfig, FraudCheckService, FraudRepository, IdentificationStatus,
    InMemoryFraudRepository, RemoteVerificationContent, SaveBatch, User, UserId,
};
use beneficiary_fraud::workflows::identification::DownloadedPicture;
use beneficiary_fraud::workflows::subscription::{
    FakeIdentificationProvider, IdentificationWebhook, InMemoryAttemptCounter,
    InMemoryPictureStorage, RecordingNotifier, RecordingSmsSender, RecordingTaskQueue,
    SubscriptionPorts, SubscriptionService, SubscriptionSettings, TaskHandler,
};
use chrono::{Local, Months};
use clap::Args;
use std::sync::Arc;

const FRONT_PICTURE_URL: &str = "https://storage.example.org/demo/front";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Age of the scripted applicant in years
    #[arg(long, default_value_t = 18)]
    pub(crate) age: u32,
    /// Global score returned by the fake vendor (1 valid, 0 undecidable, -1 invalid)
    #[arg(long, default_value_t = 1.0, allow_hyphen_values = true)]
    pub(crate) score: f64,
}

type DemoService = SubscriptionService<InMemoryFraudRepository, RecordingNotifier>;

struct DemoHarness {
    service: Arc<DemoService>,
    repository: Arc<InMemoryFraudRepository>,
    notifier: Arc<RecordingNotifier>,
    provider: Arc<FakeIdentificationProvider>,
    tasks: Arc<RecordingTaskQueue>,
    pictures: Arc<InMemoryPictureStorage>,
    sms: Arc<RecordingSmsSender>,
}

fn demo_harness() -> DemoHarness {
    let repository = Arc::new(InMemoryFraudRepository::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let provider = Arc::new(FakeIdentificationProvider::new());
    let tasks = Arc::new(RecordingTaskQueue::new());
    let pictures = Arc::new(InMemoryPictureStorage::new());
    let sms = Arc::new(RecordingSmsSender::new());

    let fraud = FraudCheckService::new(
        repository.clone(),
        EvaluationConfig::default(),
        Arc::new(FeatureToggles::default()),
        Arc::new(SystemClock),
    );
    let ports = SubscriptionPorts {
        identification: provider.clone(),
        tasks: tasks.clone(),
        pictures: pictures.clone(),
        sms: sms.clone(),
        counters: Arc::new(InMemoryAttemptCounter::new()),
    };
    let service = Arc::new(SubscriptionService::new(
        fraud,
        notifier.clone(),
        ports,
        SubscriptionSettings::default(),
    ));

    DemoHarness {
        service,
        repository,
        notifier,
        provider,
        tasks,
        pictures,
        sms,
    }
}

fn demo_applicant(age: u32) -> User {
    let today = Local::now().date_naive();
    let mut user = User::new(UserId(1), "applicant@example.org");
    user.first_name = Some("Ines".to_string());
    user.last_name = Some("Martin".to_string());
    user.date_of_birth = today.checked_sub_months(Months::new(age * 12));
    user.phone_number = Some("06 12 34 56 78".to_string());
    user.is_email_validated = true;
    user
}

fn print_progress(harness: &DemoHarness, user_id: UserId) -> Result<(), AppError> {
    let progress = harness.service.subscription_progress(user_id)?;
    let steps = progress
        .missing_steps
        .iter()
        .map(|step| format!("{step:?}"))
        .collect::<Vec<_>>();
    println!("  State: {:?}", progress.state);
    if steps.is_empty() {
        println!("  Missing steps: none");
    } else {
        println!("  Missing steps: {}", steps.join(", "));
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { age, score } = args;
    let harness = demo_harness();
    let user = demo_applicant(age);
    let user_id = user.id;
    harness
        .repository
        .save(SaveBatch::new().user(user.clone()))
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;

    println!("Beneficiary subscription demo (applicant aged {age}, vendor score {score})");
    println!("\nAfter sign-up");
    print_progress(&harness, user_id)?;

    println!("\nPhone validation");
    match harness.service.send_phone_validation_code(user_id, None) {
        Ok(()) => {
            let code = harness
                .sms
                .sent()
                .last()
                .and_then(|(_, message)| message.split_whitespace().next().map(str::to_string))
                .unwrap_or_default();
            println!("  Code sent by SMS");
            match harness
                .service
                .validate_phone_number_and_activate_user(user_id, &code)
            {
                Ok(_) => println!("  Phone number validated"),
                Err(err) => println!("  Validation refused: {err}"),
            }
        }
        Err(err) => println!("  Phone step skipped: {err}"),
    }

    println!("\nIdentity verification");
    let url = harness
        .service
        .start_identification_workflow(user_id, "https://app.example.org/identification/done")
        .await?;
    println!("  Vendor session: {url}");

    let identification_id = url.rsplit('/').next().unwrap_or_default().to_string();
    harness.provider.set_result(
        &identification_id,
        RemoteVerificationContent {
            status: Some(IdentificationStatus::Processed),
            birth_date: user.date_of_birth,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            document_type: Some("CI".to_string()),
            id_document_number: Some("880692310285".to_string()),
            score: Some(score),
            expiry_date_score: Some(1.0),
            supported: Some(1.0),
            identification_id: Some(identification_id.clone()),
            identification_url: Some(url.clone()),
            signed_image_front_url: Some(FRONT_PICTURE_URL.to_string()),
            ..RemoteVerificationContent::default()
        },
    );
    harness.provider.set_picture(
        FRONT_PICTURE_URL,
        DownloadedPicture {
            content_type: Some("image/jpeg".to_string()),
            bytes: vec![0xff, 0xd8, 0xff],
        },
    );

    for status in ["processing", "processed"] {
        let webhook = IdentificationWebhook {
            identification_id: identification_id.clone(),
            status: status.to_string(),
        };
        match harness.service.handle_identification_webhook(webhook).await {
            Ok(()) => println!("  Webhook '{status}' handled"),
            Err(err) => println!("  Webhook '{status}' failed: {err}"),
        }
    }
    print_progress(&harness, user_id)?;

    println!("\nHonor statement");
    match harness
        .service
        .record_honor_statement(user_id, "statement accepted in the demo")?
    {
        Some(user) => {
            let deposit = user.deposit.as_ref().map(|deposit| deposit.amount);
            println!("  Beneficiary activated (deposit: {deposit:?})");
        }
        None => println!("  Not activated yet"),
    }
    print_progress(&harness, user_id)?;

    println!("\nBackground tasks");
    let queued = harness.tasks.tasks();
    if queued.is_empty() {
        println!("  None queued");
    }
    for task in queued {
        let name = task.name();
        match harness.service.handle(task).await {
            Ok(()) => println!("  {name}: done"),
            Err(err) => println!("  {name}: {err}"),
        }
    }
    for file_name in harness.pictures.file_names() {
        println!("  Archived picture: {file_name}");
    }

    println!("\nNotifications");
    let sent = harness.notifier.templates();
    if sent.is_empty() {
        println!("  None sent");
    }
    for template in sent {
        println!("  - {}", template.label());
    }

    Ok(())
}
