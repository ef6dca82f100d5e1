use std::fmt;
use std::path::Path;

use anyhow::{Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{error, info};

use crate::auth;
use crate::db::Database;
use crate::error::TrainerError;
use crate::models::{
    ContactInfo, ContactInfoInput, HomeContent, HomeContentInput, MealPlan, NewMealPlan,
    NewTestimonial, NewUser, NewVideo, NewWeightRecord, NewWorkoutPlan, Role, Testimonial,
    UpdateMealPlan, UpdateTestimonial, UpdateUser, UpdateVideo, UpdateWorkoutPlan, User, Video,
    WeightProgress, WeightRecord, WorkoutPlan, validate_contact_info, validate_home_content,
    validate_new_meal_plan, validate_new_testimonial, validate_new_video,
    validate_new_workout_plan, validate_update_meal_plan, validate_update_testimonial,
    validate_update_user, validate_update_video, validate_update_workout_plan, validate_weight,
};
use crate::weight_import::{self, WeightImportSummary};

/// Last-known copy of every collection the site renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Collections {
    pub workout_plans: Vec<WorkoutPlan>,
    pub meal_plans: Vec<MealPlan>,
    pub weight_records: Vec<WeightRecord>,
    pub testimonials: Vec<Testimonial>,
    pub videos: Vec<Video>,
    pub contact_info: ContactInfo,
    pub home_content: HomeContent,
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    WorkoutPlans,
    MealPlans,
    WeightRecords,
    Testimonials,
    Videos,
    ContactInfo,
    HomeContent,
    Users,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::WorkoutPlans,
        Collection::MealPlans,
        Collection::WeightRecords,
        Collection::Testimonials,
        Collection::Videos,
        Collection::ContactInfo,
        Collection::HomeContent,
        Collection::Users,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::WorkoutPlans => "workout_plans",
            Self::MealPlans => "meal_plans",
            Self::WeightRecords => "weight_records",
            Self::Testimonials => "testimonials",
            Self::Videos => "videos",
            Self::ContactInfo => "contact_info",
            Self::HomeContent => "home_content",
            Self::Users => "users",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of [`TrainerService::load_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub failed: Vec<Collection>,
}

impl LoadReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Replace the element matching `id_of(item)` in place, or put it first.
fn patch<T>(items: &mut Vec<T>, item: T, id_of: impl Fn(&T) -> &str) {
    let id = id_of(&item).to_string();
    if let Some(slot) = items.iter_mut().find(|existing| id_of(existing) == id) {
        *slot = item;
    } else {
        items.insert(0, item);
    }
}

fn remove<T>(items: &mut Vec<T>, id: &str, id_of: impl Fn(&T) -> &str) {
    items.retain(|item| id_of(item) != id);
}

/// The data context: the store plus a snapshot every write keeps current.
pub struct TrainerService {
    db: Database,
    state: Collections,
}

impl TrainerService {
    pub fn new(db_path: &Path) -> Result<Self> {
        Ok(Self::from_database(Database::open(db_path)?))
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    /// Starts with empty collections and the built-in singleton defaults;
    /// call [`Self::load_all`] to populate.
    #[must_use]
    pub fn from_database(db: Database) -> Self {
        Self {
            db,
            state: Collections::default(),
        }
    }

    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }

    #[must_use]
    pub fn state(&self) -> &Collections {
        &self.state
    }

    // --- Loading ---

    /// Fetch every collection, keeping the last-known value of any that fails.
    pub fn load_all(&mut self) -> LoadReport {
        let mut report = LoadReport::default();
        for collection in Collection::ALL {
            if let Err(e) = self.fetch(collection) {
                error!(%collection, error = %format!("{e:#}"), "failed to fetch collection");
                report.failed.push(collection);
            }
        }
        if report.is_complete() {
            info!("loaded all collections");
        }
        report
    }

    /// Fetch every collection, stopping at the first failure.
    pub fn try_load_all(&mut self) -> Result<()> {
        for collection in Collection::ALL {
            self.fetch(collection)?;
        }
        Ok(())
    }

    pub fn fetch(&mut self, collection: Collection) -> Result<()> {
        match collection {
            Collection::WorkoutPlans => self.fetch_workout_plans(),
            Collection::MealPlans => self.fetch_meal_plans(),
            Collection::WeightRecords => self.fetch_weight_records(),
            Collection::Testimonials => self.fetch_testimonials(),
            Collection::Videos => self.fetch_videos(),
            Collection::ContactInfo => self.fetch_contact_info(),
            Collection::HomeContent => self.fetch_home_content(),
            Collection::Users => self.fetch_users(),
        }
    }

    pub fn fetch_workout_plans(&mut self) -> Result<()> {
        self.state.workout_plans = self.db.list_workout_plans(None)?;
        Ok(())
    }

    pub fn fetch_meal_plans(&mut self) -> Result<()> {
        self.state.meal_plans = self.db.list_meal_plans(None)?;
        Ok(())
    }

    pub fn fetch_weight_records(&mut self) -> Result<()> {
        self.state.weight_records = self.db.list_weight_records(None)?;
        Ok(())
    }

    pub fn fetch_testimonials(&mut self) -> Result<()> {
        self.state.testimonials = self.db.list_testimonials()?;
        Ok(())
    }

    pub fn fetch_videos(&mut self) -> Result<()> {
        self.state.videos = self.db.list_videos()?;
        Ok(())
    }

    pub fn fetch_contact_info(&mut self) -> Result<()> {
        self.state.contact_info = self.db.get_contact_info()?;
        Ok(())
    }

    pub fn fetch_home_content(&mut self) -> Result<()> {
        self.state.home_content = self.db.get_home_content()?;
        Ok(())
    }

    pub fn fetch_users(&mut self) -> Result<()> {
        self.state.users = self.db.list_users()?;
        Ok(())
    }

    // --- Snapshot views ---

    /// Every plan, or only `client_id`'s.
    #[must_use]
    pub fn workout_plans_for(&self, client_id: Option<&str>) -> Vec<WorkoutPlan> {
        self.state
            .workout_plans
            .iter()
            .filter(|p| client_id.is_none_or(|c| p.client_id == c))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn meal_plans_for(&self, client_id: Option<&str>) -> Vec<MealPlan> {
        self.state
            .meal_plans
            .iter()
            .filter(|p| client_id.is_none_or(|c| p.client_id == c))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn weight_records_for(&self, client_id: Option<&str>) -> Vec<WeightRecord> {
        self.state
            .weight_records
            .iter()
            .filter(|r| client_id.is_none_or(|c| r.client_id == c))
            .cloned()
            .collect()
    }

    // --- Workout plans ---

    pub fn add_workout_plan(&mut self, plan: &NewWorkoutPlan) -> Result<WorkoutPlan> {
        validate_new_workout_plan(plan)?;
        let created = self.db.insert_workout_plan(plan)?;
        info!(plan_id = %created.id, client_id = %created.client_id, week = created.week_number, "workout plan created");
        patch(&mut self.state.workout_plans, created.clone(), |p| p.id.as_str());
        Ok(created)
    }

    pub fn update_workout_plan(&mut self, id: &str, update: &UpdateWorkoutPlan) -> Result<WorkoutPlan> {
        validate_update_workout_plan(update)?;
        let updated = self.db.update_workout_plan(id, update)?;
        info!(plan_id = %id, "workout plan updated");
        patch(&mut self.state.workout_plans, updated.clone(), |p| p.id.as_str());
        Ok(updated)
    }

    pub fn delete_workout_plan(&mut self, id: &str) -> Result<()> {
        self.db.delete_workout_plan(id)?;
        info!(plan_id = %id, "workout plan deleted");
        remove(&mut self.state.workout_plans, id, |p| p.id.as_str());
        Ok(())
    }

    /// Deep-copy a plan for `client_id` as a fresh week-1 admin plan starting today.
    pub fn duplicate_workout_plan(&mut self, plan_id: &str, client_id: &str) -> Result<WorkoutPlan> {
        let source = self.db.get_workout_plan(plan_id)?;
        self.db.ensure_user_exists(client_id)?;
        self.add_workout_plan(&NewWorkoutPlan {
            name: format!("{} (Copy)", source.name),
            client_id: client_id.to_string(),
            week_number: 1,
            start_date: today(),
            created_by: Role::Admin,
            days: source.template_days(),
        })
    }

    /// Copy `template_plan_id` as the client's next week, starting today.
    pub fn create_new_week_plan(&mut self, client_id: &str, template_plan_id: &str) -> Result<WorkoutPlan> {
        let template = self.db.get_workout_plan(template_plan_id)?;
        self.db.ensure_user_exists(client_id)?;
        let week_number = match self.db.max_week_number(client_id)? {
            None => 1,
            Some(max) => max.checked_add(1).ok_or_else(|| {
                TrainerError::invalid(format!("week {max} cannot be followed by another week"))
            })?,
        };
        self.add_workout_plan(&NewWorkoutPlan {
            name: template.name.clone(),
            client_id: client_id.to_string(),
            week_number,
            start_date: today(),
            created_by: Role::Client,
            days: template.template_days(),
        })
    }

    // --- Meal plans ---

    pub fn add_meal_plan(&mut self, plan: &NewMealPlan) -> Result<MealPlan> {
        validate_new_meal_plan(plan)?;
        let created = self.db.insert_meal_plan(plan)?;
        info!(plan_id = %created.id, client_id = %created.client_id, "meal plan created");
        patch(&mut self.state.meal_plans, created.clone(), |p| p.id.as_str());
        Ok(created)
    }

    pub fn update_meal_plan(&mut self, id: &str, update: &UpdateMealPlan) -> Result<MealPlan> {
        validate_update_meal_plan(update)?;
        let updated = self.db.update_meal_plan(id, update)?;
        info!(plan_id = %id, "meal plan updated");
        patch(&mut self.state.meal_plans, updated.clone(), |p| p.id.as_str());
        Ok(updated)
    }

    pub fn delete_meal_plan(&mut self, id: &str) -> Result<()> {
        self.db.delete_meal_plan(id)?;
        info!(plan_id = %id, "meal plan deleted");
        remove(&mut self.state.meal_plans, id, |p| p.id.as_str());
        Ok(())
    }

    // --- Weight ---

    pub fn add_weight_record(&mut self, record: &NewWeightRecord) -> Result<WeightRecord> {
        validate_weight(record.weight)?;
        let created = self.db.insert_weight_record(record)?;
        info!(record_id = %created.id, client_id = %created.client_id, "weight record added");
        self.place_weight_record(created.clone());
        Ok(created)
    }

    /// Store a batch atomically. One invalid or failing record stores none.
    pub fn add_weight_records(&mut self, records: &[NewWeightRecord]) -> Result<Vec<WeightRecord>> {
        for record in records {
            validate_weight(record.weight)?;
        }
        let created = self.db.insert_weight_records(records)?;
        info!(count = created.len(), "weight records added");
        for record in &created {
            self.place_weight_record(record.clone());
        }
        Ok(created)
    }

    /// Newest date first, matching the fetch order.
    fn place_weight_record(&mut self, record: WeightRecord) {
        let records = &mut self.state.weight_records;
        let at = records
            .iter()
            .position(|r| r.date <= record.date)
            .unwrap_or(records.len());
        records.insert(at, record);
    }

    pub fn delete_weight_record(&mut self, id: &str) -> Result<()> {
        self.db.delete_weight_record(id)?;
        info!(record_id = %id, "weight record deleted");
        remove(&mut self.state.weight_records, id, |r| r.id.as_str());
        Ok(())
    }

    pub fn weight_progress(&self, client_id: &str) -> Result<WeightProgress> {
        self.db.ensure_user_exists(client_id)?;
        let records = self.db.list_weight_records(Some(client_id))?;
        Ok(WeightProgress::from_records(client_id, records))
    }

    pub fn import_weight_csv(
        &mut self,
        client_id: &str,
        csv_data: &str,
        dry_run: bool,
    ) -> Result<WeightImportSummary> {
        let rows = weight_import::parse_weight_csv(csv_data.as_bytes())?;
        weight_import::import_weight_records(self, client_id, &rows, dry_run)
    }

    // --- Testimonials ---

    pub fn add_testimonial(&mut self, testimonial: &NewTestimonial) -> Result<Testimonial> {
        validate_new_testimonial(testimonial)?;
        let created = self.db.insert_testimonial(testimonial)?;
        info!(testimonial_id = %created.id, "testimonial added");
        patch(&mut self.state.testimonials, created.clone(), |t| t.id.as_str());
        Ok(created)
    }

    pub fn update_testimonial(&mut self, id: &str, update: &UpdateTestimonial) -> Result<Testimonial> {
        validate_update_testimonial(update)?;
        let updated = self.db.update_testimonial(id, update)?;
        patch(&mut self.state.testimonials, updated.clone(), |t| t.id.as_str());
        Ok(updated)
    }

    pub fn delete_testimonial(&mut self, id: &str) -> Result<()> {
        self.db.delete_testimonial(id)?;
        info!(testimonial_id = %id, "testimonial deleted");
        remove(&mut self.state.testimonials, id, |t| t.id.as_str());
        Ok(())
    }

    // --- Videos ---

    pub fn add_video(&mut self, video: &NewVideo) -> Result<Video> {
        validate_new_video(video)?;
        let created = self.db.insert_video(video)?;
        info!(video_id = %created.id, youtube_id = %created.youtube_id, "video added");
        patch(&mut self.state.videos, created.clone(), |v| v.id.as_str());
        Ok(created)
    }

    pub fn update_video(&mut self, id: &str, update: &UpdateVideo) -> Result<Video> {
        validate_update_video(update)?;
        let updated = self.db.update_video(id, update)?;
        patch(&mut self.state.videos, updated.clone(), |v| v.id.as_str());
        Ok(updated)
    }

    pub fn delete_video(&mut self, id: &str) -> Result<()> {
        self.db.delete_video(id)?;
        info!(video_id = %id, "video deleted");
        remove(&mut self.state.videos, id, |v| v.id.as_str());
        Ok(())
    }

    // --- Site settings ---

    pub fn update_contact_info(&mut self, info: &ContactInfoInput) -> Result<ContactInfo> {
        validate_contact_info(info)?;
        let saved = self.db.upsert_contact_info(info)?;
        info!("contact info updated");
        self.state.contact_info = saved.clone();
        Ok(saved)
    }

    pub fn update_home_content(&mut self, content: &HomeContentInput) -> Result<HomeContent> {
        validate_home_content(content)?;
        let saved = self.db.upsert_home_content(content)?;
        info!(services = saved.services.len(), "home content updated");
        self.state.home_content = saved.clone();
        Ok(saved)
    }

    pub fn add_service(&mut self, service: &str) -> Result<HomeContent> {
        let mut content = HomeContentInput::from(&self.db.get_home_content()?);
        content.services.push(service.trim().to_string());
        self.update_home_content(&content)
    }

    /// Remove the service at `index` (0-based). The last one cannot be removed.
    pub fn remove_service(&mut self, index: usize) -> Result<HomeContent> {
        let mut content = HomeContentInput::from(&self.db.get_home_content()?);
        if content.services.len() <= 1 {
            bail!(TrainerError::invalid("At least one service is required"));
        }
        if index >= content.services.len() {
            bail!(TrainerError::invalid(format!(
                "Service #{} does not exist ({} listed)",
                index + 1,
                content.services.len()
            )));
        }
        content.services.remove(index);
        self.update_home_content(&content)
    }

    // --- Users ---

    pub fn get_user(&self, id: &str) -> Result<User> {
        self.db.get_user(id)
    }

    pub fn add_user(&mut self, user: &NewUser) -> Result<User> {
        let created = auth::create_user(&self.db, user)?;
        patch(&mut self.state.users, created.clone(), |u| u.id.as_str());
        Ok(created)
    }

    /// Like [`Self::add_user`] with the bcrypt work already done by the caller.
    pub fn add_user_with_hash(&mut self, user: &NewUser, password_hash: &str) -> Result<User> {
        let created = auth::create_user_with_hash(&self.db, user, password_hash)?;
        patch(&mut self.state.users, created.clone(), |u| u.id.as_str());
        Ok(created)
    }

    /// The password is re-hashed only when the update carries one.
    pub fn update_user(&mut self, id: &str, update: &UpdateUser) -> Result<User> {
        validate_update_user(update)?;
        let hash = update
            .password
            .as_deref()
            .map(auth::hash_password)
            .transpose()?;
        self.update_user_with_hash(id, update, hash.as_deref())
    }

    /// `password_hash` replaces the stored hash when given; `update.password` is ignored.
    pub fn update_user_with_hash(
        &mut self,
        id: &str,
        update: &UpdateUser,
        password_hash: Option<&str>,
    ) -> Result<User> {
        validate_update_user(update)?;
        let updated = self.db.update_user(id, update, password_hash)?;
        info!(user_id = %id, password_changed = password_hash.is_some(), "user updated");
        patch(&mut self.state.users, updated.clone(), |u| u.id.as_str());
        Ok(updated)
    }

    /// Removes the account along with its plans and weight history.
    pub fn delete_user(&mut self, id: &str) -> Result<()> {
        self.db.delete_user(id)?;
        info!(user_id = %id, "user deleted");
        remove(&mut self.state.users, id, |u| u.id.as_str());
        self.state.workout_plans.retain(|p| p.client_id != id);
        self.state.meal_plans.retain(|p| p.client_id != id);
        self.state.weight_records.retain(|r| r.client_id != id);
        Ok(())
    }
}
