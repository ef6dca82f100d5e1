use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TrainerError;

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

// --- Roles and enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "client" => Ok(Self::Client),
            _ => bail!(TrainerError::invalid(format!(
                "Invalid role '{s}'. Must be one of: admin, client"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroType {
    Carb,
    Pro,
    Fat,
}

impl MacroType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Carb => "Carb",
            Self::Pro => "Pro",
            Self::Fat => "Fat",
        }
    }
}

impl fmt::Display for MacroType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MacroType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "carb" | "carbs" => Ok(Self::Carb),
            "pro" | "protein" => Ok(Self::Pro),
            "fat" => Ok(Self::Fat),
            _ => bail!(TrainerError::invalid(format!(
                "Invalid macro type '{s}'. Must be one of: Carb, Pro, Fat"
            ))),
        }
    }
}

// --- Users ---

/// An account row. The password hash never leaves the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub phone: Option<String>,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start_date: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

fn default_role() -> Role {
    Role::Client
}

#[derive(Debug, Clone, Default, Deserialize)]
#[allow(clippy::option_option)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub phone: Option<Option<String>>,
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub avatar: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub start_date: Option<Option<NaiveDate>>,
    /// Re-hashed when present; the stored hash is kept otherwise.
    pub password: Option<String>,
}

// --- Workout plans ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutPlan {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub week_number: i64,
    pub start_date: NaiveDate,
    pub created_by: Role,
    pub created_at: String,
    pub updated_at: String,
    pub days: Vec<WorkoutDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutDay {
    pub id: String,
    pub day_name: String,
    pub day_order: i64,
    pub is_rest_day: bool,
    pub exercises: Vec<Exercise>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub name: String,
    pub exercise_order: i64,
    pub sets: Vec<ExerciseSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSet {
    pub id: String,
    pub set_number: i64,
    pub reps: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reality: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub volume: Option<f64>,
}

/// One day of a plan as submitted by a form. `id` matches an existing day
/// of the same plan on update; anything else is inserted as a new row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutDayInput {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    pub day_name: String,
    #[serde(default)]
    pub is_rest_day: bool,
    #[serde(default)]
    pub exercises: Vec<ExerciseInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseInput {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub sets: Vec<ExerciseSetInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSetInput {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    pub reps: i64,
    #[serde(default)]
    pub reality: Option<i64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWorkoutPlan {
    pub name: String,
    pub client_id: String,
    #[serde(default = "default_week_number")]
    pub week_number: i64,
    pub start_date: NaiveDate,
    #[serde(default = "default_created_by")]
    pub created_by: Role,
    #[serde(default)]
    pub days: Vec<WorkoutDayInput>,
}

fn default_week_number() -> i64 {
    1
}

fn default_created_by() -> Role {
    Role::Admin
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateWorkoutPlan {
    pub name: Option<String>,
    pub client_id: Option<String>,
    pub week_number: Option<i64>,
    pub start_date: Option<NaiveDate>,
    /// Replaces the whole day tree when present.
    pub days: Option<Vec<WorkoutDayInput>>,
}

impl WorkoutPlan {
    /// The plan's day tree as fresh input, with every id dropped.
    #[must_use]
    pub fn template_days(&self) -> Vec<WorkoutDayInput> {
        self.days
            .iter()
            .map(|day| WorkoutDayInput {
                id: None,
                day_name: day.day_name.clone(),
                is_rest_day: day.is_rest_day,
                exercises: day
                    .exercises
                    .iter()
                    .map(|ex| ExerciseInput {
                        id: None,
                        name: ex.name.clone(),
                        sets: ex
                            .sets
                            .iter()
                            .map(|s| ExerciseSetInput {
                                id: None,
                                reps: s.reps,
                                reality: s.reality,
                                weight: s.weight,
                                volume: s.volume,
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect()
    }

    #[must_use]
    pub fn exercise_count(&self) -> usize {
        self.days.iter().map(|d| d.exercises.len()).sum()
    }
}

// --- Meal plans ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlan {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub total_calories: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub meals: Vec<Meal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub id: String,
    pub name: String,
    pub total_calories: i64,
    pub meal_order: i64,
    pub foods: Vec<MealFood>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealFood {
    pub id: String,
    pub name: String,
    pub macro_type: MacroType,
    pub calories: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
    pub food_order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealInput {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    pub name: String,
    /// Sum of the foods' calories when omitted.
    #[serde(default)]
    pub total_calories: Option<i64>,
    #[serde(default)]
    pub foods: Vec<MealFoodInput>,
}

impl MealInput {
    #[must_use]
    pub fn resolved_calories(&self) -> i64 {
        self.total_calories
            .unwrap_or_else(|| self.foods.iter().map(|f| f.calories).sum())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealFoodInput {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    pub name: String,
    pub macro_type: MacroType,
    pub calories: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMealPlan {
    pub name: String,
    pub client_id: String,
    /// Sum of the meals' calories when omitted.
    #[serde(default)]
    pub total_calories: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub meals: Vec<MealInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[allow(clippy::option_option)]
pub struct UpdateMealPlan {
    pub name: Option<String>,
    pub client_id: Option<String>,
    pub total_calories: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub notes: Option<Option<String>>,
    pub meals: Option<Vec<MealInput>>,
}

#[must_use]
pub fn sum_meal_calories(meals: &[MealInput]) -> i64 {
    meals.iter().map(MealInput::resolved_calories).sum()
}

// --- Weight tracking ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    pub id: String,
    pub client_id: String,
    /// Kilograms.
    pub weight: f64,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWeightRecord {
    pub client_id: String,
    pub weight: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeightProgress {
    pub client_id: String,
    /// Oldest first.
    pub records: Vec<WeightRecord>,
    pub start_weight: Option<f64>,
    pub current_weight: Option<f64>,
    pub change: Option<f64>,
}

impl WeightProgress {
    /// Build from records in any order.
    #[must_use]
    pub fn from_records(client_id: &str, mut records: Vec<WeightRecord>) -> Self {
        records.sort_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)));
        let start_weight = records.first().map(|r| r.weight);
        let current_weight = records.last().map(|r| r.weight);
        let change = start_weight.zip(current_weight).map(|(s, c)| c - s);
        Self {
            client_id: client_id.to_string(),
            records,
            start_weight,
            current_weight,
            change,
        }
    }
}

// --- Site content ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Testimonial {
    pub id: String,
    pub name: String,
    pub content: String,
    pub rating: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub before_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub after_image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTestimonial {
    pub name: String,
    pub content: String,
    #[serde(default = "default_rating")]
    pub rating: i64,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub before_image: Option<String>,
    #[serde(default)]
    pub after_image: Option<String>,
}

fn default_rating() -> i64 {
    5
}

#[derive(Debug, Clone, Default, Deserialize)]
#[allow(clippy::option_option)]
pub struct UpdateTestimonial {
    pub name: Option<String>,
    pub content: Option<String>,
    pub rating: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub avatar: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub before_image: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub after_image: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub youtube_id: String,
    pub description: String,
    pub category: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVideo {
    pub title: String,
    pub youtube_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateVideo {
    pub title: Option<String>,
    pub youtube_id: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Singleton row; the built-in default stands in until one is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub phone: String,
    pub facebook: String,
    pub zalo: String,
    pub email: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Default for ContactInfo {
    fn default() -> Self {
        Self {
            phone: "0123456789".to_string(),
            facebook: "https://facebook.com/phinpt".to_string(),
            zalo: "https://zalo.me/0123456789".to_string(),
            email: "contact@phinpt.com".to_string(),
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContactInfoInput {
    pub phone: String,
    pub facebook: String,
    pub zalo: String,
    pub email: String,
}

impl From<&ContactInfo> for ContactInfoInput {
    fn from(info: &ContactInfo) -> Self {
        Self {
            phone: info.phone.clone(),
            facebook: info.facebook.clone(),
            zalo: info.zalo.clone(),
            email: info.email.clone(),
        }
    }
}

/// Singleton row for the landing page; the built-in default stands in until one is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeContent {
    pub hero_title: String,
    pub hero_subtitle: String,
    #[serde(default)]
    pub hero_image: Option<String>,
    pub about_text: String,
    #[serde(default)]
    pub about_image: Option<String>,
    pub services_title: String,
    pub services: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Default for HomeContent {
    fn default() -> Self {
        Self {
            hero_title: "Phi Nguyễn Personal Trainer".to_string(),
            hero_subtitle:
                "Chuyên gia huấn luyện cá nhân - Giúp bạn đạt được mục tiêu fitness".to_string(),
            hero_image: None,
            about_text: "Với nhiều năm kinh nghiệm trong lĩnh vực fitness, tôi cam kết mang đến cho bạn những buổi tập hiệu quả nhất.".to_string(),
            about_image: None,
            services_title: "Dịch vụ của tôi".to_string(),
            services: vec![
                "Personal Training 1-1".to_string(),
                "Lập kế hoạch tập luyện".to_string(),
                "Tư vấn dinh dưỡng".to_string(),
                "Theo dõi tiến độ".to_string(),
            ],
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HomeContentInput {
    pub hero_title: String,
    pub hero_subtitle: String,
    #[serde(default)]
    pub hero_image: Option<String>,
    pub about_text: String,
    #[serde(default)]
    pub about_image: Option<String>,
    pub services_title: String,
    pub services: Vec<String>,
}

impl From<&HomeContent> for HomeContentInput {
    fn from(content: &HomeContent) -> Self {
        Self {
            hero_title: content.hero_title.clone(),
            hero_subtitle: content.hero_subtitle.clone(),
            hero_image: content.hero_image.clone(),
            about_text: content.about_text.clone(),
            about_image: content.about_image.clone(),
            services_title: content.services_title.clone(),
            services: content.services.clone(),
        }
    }
}

// --- Validation ---

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!(TrainerError::invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<()> {
    require_text("username", username)?;
    if username.chars().any(char::is_whitespace) {
        bail!(TrainerError::invalid("username must not contain whitespace"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        bail!(TrainerError::invalid(format!("Invalid email '{email}'")));
    }
    Ok(())
}

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!(TrainerError::invalid(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_new_user(user: &NewUser) -> Result<()> {
    validate_username(&user.username)?;
    validate_email(&user.email)?;
    validate_password(&user.password)?;
    require_text("full_name", &user.full_name)
}

pub fn validate_update_user(update: &UpdateUser) -> Result<()> {
    if let Some(ref username) = update.username {
        validate_username(username)?;
    }
    if let Some(ref email) = update.email {
        validate_email(email)?;
    }
    if let Some(ref password) = update.password {
        validate_password(password)?;
    }
    if let Some(ref full_name) = update.full_name {
        require_text("full_name", full_name)?;
    }
    Ok(())
}

fn validate_non_negative(field: &str, value: f64) -> Result<()> {
    if value < 0.0 {
        bail!(TrainerError::invalid(format!("{field} must not be negative")));
    }
    Ok(())
}

pub fn validate_workout_days(days: &[WorkoutDayInput]) -> Result<()> {
    for day in days {
        require_text("day_name", &day.day_name)?;
        if day.is_rest_day && !day.exercises.is_empty() {
            bail!(TrainerError::invalid(format!(
                "Rest day '{}' must not contain exercises",
                day.day_name
            )));
        }
        for exercise in &day.exercises {
            require_text("exercise name", &exercise.name)?;
            for set in &exercise.sets {
                if set.reps < 0 {
                    bail!(TrainerError::invalid("reps must not be negative"));
                }
                if set.reality.is_some_and(|r| r < 0) {
                    bail!(TrainerError::invalid("reality must not be negative"));
                }
                if let Some(weight) = set.weight {
                    validate_non_negative("weight", weight)?;
                }
                if let Some(volume) = set.volume {
                    validate_non_negative("volume", volume)?;
                }
            }
        }
    }
    Ok(())
}

/// Twenty years of weekly plans.
pub const MAX_WEEK_NUMBER: i64 = 1040;

fn validate_week_number(week_number: i64) -> Result<()> {
    if !(1..=MAX_WEEK_NUMBER).contains(&week_number) {
        bail!(TrainerError::invalid(format!(
            "week_number must be between 1 and {MAX_WEEK_NUMBER} (got {week_number})"
        )));
    }
    Ok(())
}

pub fn validate_new_workout_plan(plan: &NewWorkoutPlan) -> Result<()> {
    require_text("name", &plan.name)?;
    validate_week_number(plan.week_number)?;
    validate_workout_days(&plan.days)
}

pub fn validate_update_workout_plan(update: &UpdateWorkoutPlan) -> Result<()> {
    if let Some(ref name) = update.name {
        require_text("name", name)?;
    }
    if let Some(week_number) = update.week_number {
        validate_week_number(week_number)?;
    }
    if let Some(ref days) = update.days {
        validate_workout_days(days)?;
    }
    Ok(())
}

/// Upper bound for any single calorie figure.
pub const MAX_CALORIES: i64 = 100_000;

fn validate_calories(field: &str, calories: i64) -> Result<()> {
    if calories < 0 {
        bail!(TrainerError::invalid(format!("{field} must not be negative")));
    }
    if calories > MAX_CALORIES {
        bail!(TrainerError::invalid(format!(
            "{field} must be at most {MAX_CALORIES} (got {calories})"
        )));
    }
    Ok(())
}

pub fn validate_meals(meals: &[MealInput]) -> Result<()> {
    for meal in meals {
        require_text("meal name", &meal.name)?;
        if let Some(total) = meal.total_calories {
            validate_calories("meal total_calories", total)?;
        }
        for food in &meal.foods {
            require_text("food name", &food.name)?;
            validate_calories("food calories", food.calories)?;
        }
    }
    Ok(())
}

pub fn validate_new_meal_plan(plan: &NewMealPlan) -> Result<()> {
    require_text("name", &plan.name)?;
    if let Some(total) = plan.total_calories {
        validate_calories("total_calories", total)?;
    }
    validate_meals(&plan.meals)
}

pub fn validate_update_meal_plan(update: &UpdateMealPlan) -> Result<()> {
    if let Some(ref name) = update.name {
        require_text("name", name)?;
    }
    if let Some(total) = update.total_calories {
        validate_calories("total_calories", total)?;
    }
    if let Some(ref meals) = update.meals {
        validate_meals(meals)?;
    }
    Ok(())
}

pub fn validate_weight(weight: f64) -> Result<()> {
    if !weight.is_finite() || weight <= 0.0 {
        bail!(TrainerError::invalid("weight must be greater than 0"));
    }
    Ok(())
}

pub fn validate_rating(rating: i64) -> Result<()> {
    if !(1..=5).contains(&rating) {
        bail!(TrainerError::invalid(format!(
            "rating must be between 1 and 5 (got {rating})"
        )));
    }
    Ok(())
}

pub fn validate_new_testimonial(testimonial: &NewTestimonial) -> Result<()> {
    require_text("name", &testimonial.name)?;
    require_text("content", &testimonial.content)?;
    validate_rating(testimonial.rating)
}

pub fn validate_update_testimonial(update: &UpdateTestimonial) -> Result<()> {
    if let Some(ref name) = update.name {
        require_text("name", name)?;
    }
    if let Some(ref content) = update.content {
        require_text("content", content)?;
    }
    if let Some(rating) = update.rating {
        validate_rating(rating)?;
    }
    Ok(())
}

/// Length of a YouTube video id.
const YOUTUBE_ID_LEN: usize = 11;

fn is_youtube_id(s: &str) -> bool {
    s.len() == YOUTUBE_ID_LEN
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn validate_youtube_id(youtube_id: &str) -> Result<()> {
    if !is_youtube_id(youtube_id) {
        bail!(TrainerError::invalid(format!(
            "Invalid YouTube id '{youtube_id}'. Expected 11 characters of [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

/// Pull the video id out of a watch, short, or embed URL; bare ids pass through.
#[must_use]
pub fn extract_youtube_id(input: &str) -> Option<String> {
    let input = input.trim();
    if is_youtube_id(input) {
        return Some(input.to_string());
    }
    let candidate = if let Some((_, query)) = input.split_once("watch?") {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("v="))
            .unwrap_or_default()
    } else if let Some((_, rest)) = input.split_once("youtu.be/") {
        rest
    } else if let Some((_, rest)) = input.split_once("/embed/") {
        rest
    } else if let Some((_, rest)) = input.split_once("/shorts/") {
        rest
    } else {
        return None;
    };
    let id: String = candidate
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    is_youtube_id(&id).then_some(id)
}

pub fn validate_new_video(video: &NewVideo) -> Result<()> {
    require_text("title", &video.title)?;
    validate_youtube_id(&video.youtube_id)
}

pub fn validate_update_video(update: &UpdateVideo) -> Result<()> {
    if let Some(ref title) = update.title {
        require_text("title", title)?;
    }
    if let Some(ref youtube_id) = update.youtube_id {
        validate_youtube_id(youtube_id)?;
    }
    Ok(())
}

pub fn validate_contact_info(info: &ContactInfoInput) -> Result<()> {
    require_text("phone", &info.phone)?;
    require_text("facebook", &info.facebook)?;
    require_text("zalo", &info.zalo)?;
    validate_email(&info.email)
}

/// Mirrors the content form: every text field is required and the
/// services list keeps at least one non-empty entry.
pub fn validate_home_content(content: &HomeContentInput) -> Result<()> {
    require_text("hero_title", &content.hero_title)?;
    require_text("hero_subtitle", &content.hero_subtitle)?;
    require_text("about_text", &content.about_text)?;
    require_text("services_title", &content.services_title)?;
    if content.services.is_empty() {
        bail!(TrainerError::invalid("services must contain at least one entry"));
    }
    for (i, service) in content.services.iter().enumerate() {
        if service.trim().is_empty() {
            bail!(TrainerError::invalid(format!(
                "service #{} must not be empty",
                i + 1
            )));
        }
    }
    Ok(())
}
