use crate::utils::Config;
use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

const VISION_API_PATH: &str = "vision/v3.2/analyze?visualFeatures=Tags,Description";
const OPENAI_API_VERSION: &str = "2024-02-01";
const TAG_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Nutrients {
    pub calories: i32,
    pub carbs: i32,
    pub protein: i32,
    pub fat: i32,
}

struct KnownFood {
    name: &'static str,
    nutrients: Nutrients,
    kind: &'static str,
}

const fn food(name: &'static str, calories: i32, carbs: i32, protein: i32, fat: i32, kind: &'static str) -> KnownFood {
    KnownFood {
        name,
        nutrients: Nutrients { calories, carbs, protein, fat },
        kind,
    }
}

const KNOWN_FOODS: [KnownFood; 9] = [
    food("fufu", 250, 60, 5, 1, "starch"),
    food("banku", 280, 65, 6, 2, "starch"),
    food("kenkey", 270, 63, 5, 1, "starch"),
    food("jollof rice", 200, 45, 4, 5, "grain"),
    food("waakye", 220, 48, 8, 3, "grain"),
    food("tilapia", 180, 0, 35, 5, "protein"),
    food("plantain", 120, 31, 1, 0, "fruit"),
    food("kontomire stew", 150, 10, 8, 8, "vegetable"),
    food("red red", 300, 40, 12, 10, "legume"),
];

fn known_food(name: &str) -> Option<&'static KnownFood> {
    let name = name.to_ascii_lowercase();
    KNOWN_FOODS.iter().find(|f| f.name == name)
}

/// What the image model thinks is on the plate
#[derive(Debug, Clone, Serialize)]
pub struct FoodDetection {
    pub description: String,
    pub tags: Vec<String>,
    pub detected_food: String,
    pub food_type: String,
    pub nutrients: Nutrients,
    pub confidence: f64,
    pub analysis_source: &'static str,
}

impl FoodDetection {
    fn mock() -> Self {
        Self {
            description: "A plate of food".to_string(),
            tags: vec!["food".into(), "plate".into(), "meal".into()],
            detected_food: "Sample Ghanaian Meal".to_string(),
            food_type: "balanced".to_string(),
            nutrients: Nutrients { calories: 250, carbs: 50, protein: 15, fat: 8 },
            confidence: 0.8,
            analysis_source: "mock_service",
        }
    }
}

/// Condition-aware assessment of a detected meal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutritionAnalysis {
    pub description: String,
    pub nutrients: Nutrients,
    pub diet_score: i32,
    pub immediate_recommendation: String,
    pub balancing_advice: String,
    pub warning_level: String,
}

#[derive(Deserialize)]
struct VisionResponse {
    #[serde(default)]
    tags: Vec<VisionTag>,
    description: Option<VisionDescription>,
}

#[derive(Deserialize)]
struct VisionTag {
    name: String,
    confidence: f64,
}

#[derive(Deserialize)]
struct VisionDescription {
    #[serde(default)]
    captions: Vec<VisionCaption>,
}

#[derive(Deserialize)]
struct VisionCaption {
    text: String,
    confidence: f64,
}

/// Azure AI Vision for detection, Azure OpenAI for the nutrition write-up
pub struct VisionService {
    http: reqwest::Client,
    vision_endpoint: Option<String>,
    vision_key: Option<String>,
    openai_endpoint: Option<String>,
    openai_key: Option<String>,
    deployment: String,
}

impl VisionService {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        let trim = |url: &Option<String>| url.as_ref().map(|u| u.trim_end_matches('/').to_string());
        Self {
            http,
            vision_endpoint: trim(&config.services.azure_vision_endpoint),
            vision_key: config.services.azure_vision_key.clone(),
            openai_endpoint: trim(&config.services.azure_openai_endpoint),
            openai_key: config.services.azure_openai_key.clone(),
            deployment: config.services.azure_openai_deployment.clone(),
        }
    }

    pub fn vision_configured(&self) -> bool {
        self.vision_endpoint.is_some() && self.vision_key.is_some()
    }

    pub fn openai_configured(&self) -> bool {
        self.openai_endpoint.is_some() && self.openai_key.is_some()
    }

    pub async fn detect_food(&self, image: Bytes) -> FoodDetection {
        let (Some(endpoint), Some(key)) = (&self.vision_endpoint, &self.vision_key) else {
            tracing::warn!("Azure Vision not configured, using mock analysis");
            return FoodDetection::mock();
        };

        let response = self
            .http
            .post(format!("{}/{}", endpoint, VISION_API_PATH))
            .header("Ocp-Apim-Subscription-Key", key)
            .header("Content-Type", "application/octet-stream")
            .body(image)
            .send()
            .await;

        let parsed = match response {
            Ok(r) if r.status().is_success() => r.json::<VisionResponse>().await,
            Ok(r) => {
                tracing::error!(status = %r.status(), "Azure Vision rejected image");
                return FoodDetection::mock();
            }
            Err(e) => Err(e),
        };

        match parsed {
            Ok(result) => detection_from(result),
            Err(e) => {
                tracing::error!("Error analysing food image: {}", e);
                FoodDetection::mock()
            }
        }
    }

    pub async fn analyze_nutrition(&self, detection: &FoodDetection, conditions: &[String]) -> NutritionAnalysis {
        let (Some(endpoint), Some(key)) = (&self.openai_endpoint, &self.openai_key) else {
            return fallback_analysis(detection, conditions);
        };

        let prompt = format!(
            "Food: {}\nNutrients: {}\nPatient conditions: {}\n\
             Reply with JSON only, with keys description, nutrients (calories, carbs, protein, fat), \
             diet_score (0-100), immediate_recommendation, balancing_advice, warning_level (low|medium|high). \
             Use Ghanaian food context.",
            detection.detected_food,
            json!(detection.nutrients),
            if conditions.is_empty() { "none".to_string() } else { conditions.join(", ") },
        );

        let body = json!({
            "messages": [
                { "role": "system", "content": "You are a helpful Ghanaian health assistant for chronic disease management." },
                { "role": "user", "content": prompt }
            ],
            "max_tokens": 400,
            "temperature": 0.3,
        });

        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint, self.deployment, OPENAI_API_VERSION
        );

        let reply = match self.http.post(url).header("api-key", key).json(&body).send().await {
            Ok(r) if r.status().is_success() => r.json::<serde_json::Value>().await.ok(),
            Ok(r) => {
                tracing::error!(status = %r.status(), "Azure OpenAI request failed");
                None
            }
            Err(e) => {
                tracing::error!("Azure OpenAI request failed: {}", e);
                None
            }
        };

        reply
            .as_ref()
            .and_then(|v| v.pointer("/choices/0/message/content"))
            .and_then(|c| c.as_str())
            .and_then(parse_analysis)
            .map(|mut analysis| {
                analysis.diet_score = analysis.diet_score.clamp(0, 100);
                analysis
            })
            .unwrap_or_else(|| fallback_analysis(detection, conditions))
    }
}

fn detection_from(result: VisionResponse) -> FoodDetection {
    let tags: Vec<String> = result
        .tags
        .iter()
        .filter(|t| t.confidence > TAG_CONFIDENCE)
        .map(|t| t.name.to_lowercase())
        .collect();
    let caption = result.description.and_then(|d| d.captions.into_iter().next());
    let description = caption.as_ref().map(|c| c.text.clone()).unwrap_or_default();
    let confidence = caption.as_ref().map(|c| c.confidence).unwrap_or(0.5);
    let lowered = description.to_lowercase();

    let matched = KNOWN_FOODS
        .iter()
        .find(|f| f.name.split(' ').any(|word| lowered.contains(word)))
        .or_else(|| {
            tags.iter().find_map(|tag| {
                KNOWN_FOODS
                    .iter()
                    .find(|f| f.name.contains(tag.as_str()) || tag.contains(f.name))
            })
        });

    let (detected_food, food_type, nutrients) = match matched {
        Some(f) => (f.name.to_string(), f.kind.to_string(), f.nutrients),
        None => (
            "Unknown food".to_string(),
            "unknown".to_string(),
            Nutrients { calories: 200, carbs: 40, protein: 10, fat: 5 },
        ),
    };

    FoodDetection {
        description,
        tags,
        detected_food,
        food_type,
        nutrients,
        confidence,
        analysis_source: "azure_ai_vision",
    }
}

/// Pull the JSON object out of a chat reply that may be fenced
fn parse_analysis(content: &str) -> Option<NutritionAnalysis> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    serde_json::from_str(content.get(start..=end)?).ok()
}

fn fallback_analysis(detection: &FoodDetection, conditions: &[String]) -> NutritionAnalysis {
    let diabetic = conditions.iter().any(|c| c.to_lowercase().contains("diabet"));
    let kind = known_food(&detection.detected_food)
        .map(|f| f.kind)
        .unwrap_or(detection.food_type.as_str());

    let (diet_score, warning, advice) = match kind {
        "starch" if diabetic => (
            55,
            "medium",
            "This meal is high in starch. For better blood sugar control, reduce the portion and add leafy vegetables like kontomire.",
        ),
        "starch" => (65, "low", "Pair starchy staples with a protein-rich soup and vegetables."),
        "protein" => (
            80,
            "low",
            "Good protein choice! Consider adding a side of vegetables for balanced nutrition.",
        ),
        "vegetable" | "legume" => (85, "low", "Great choice. Keep portions of palm oil moderate."),
        _ => (
            70,
            "low",
            "Your meal looks balanced. Remember to drink plenty of water and take your medications as prescribed.",
        ),
    };

    NutritionAnalysis {
        description: format!("A plate of {}", detection.detected_food.replace('_', " ")),
        nutrients: detection.nutrients,
        diet_score,
        immediate_recommendation: advice.to_string(),
        balancing_advice: "Balance your next meal with vegetables and lean protein.".to_string(),
        warning_level: warning.to_string(),
    }
}

/// Analysis stored with a manually logged meal; returns (analysis, nutrients, score)
pub fn manual_log_analysis(diet_score: Option<i32>) -> (serde_json::Value, serde_json::Value, i32) {
    let mut rng = rand::thread_rng();
    let nutrients = json!({
        "protein": rng.gen_range(10..=30),
        "carbs": rng.gen_range(20..=60),
        "fats": rng.gen_range(5..=20),
    });
    let analysis = json!({
        "analysis": "Food analyzed successfully",
        "nutrients": nutrients,
        "recommendations": ["Good balance of nutrients", "Consider adding more vegetables"],
    });
    let score = diet_score.unwrap_or_else(|| rng.gen_range(60..=95));
    (analysis, nutrients, score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vision(server: &mockito::Server) -> VisionService {
        let mut config = Config::default();
        config.services.azure_vision_endpoint = Some(server.url());
        config.services.azure_vision_key = Some("vk".into());
        config.services.azure_openai_endpoint = Some(server.url());
        config.services.azure_openai_key = Some("ok".into());
        config.services.azure_openai_deployment = "meals".into();
        VisionService::new(reqwest::Client::new(), &config)
    }

    #[tokio::test]
    async fn unconfigured_detection_is_mocked() {
        let service = VisionService::new(reqwest::Client::new(), &Config::default());
        let detection = service.detect_food(Bytes::from_static(b"img")).await;
        assert_eq!(detection.analysis_source, "mock_service");
    }

    #[tokio::test]
    async fn caption_matches_known_food() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/vision/v3.2/analyze")
            .match_query(mockito::Matcher::Any)
            .match_header("ocp-apim-subscription-key", "vk")
            .with_status(200)
            .with_body(
                json!({
                    "tags": [{ "name": "Food", "confidence": 0.99 }, { "name": "bowl", "confidence": 0.4 }],
                    "description": { "captions": [{ "text": "a bowl of jollof rice", "confidence": 0.91 }] }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let detection = vision(&server).detect_food(Bytes::from_static(b"img")).await;
        assert_eq!(detection.detected_food, "jollof rice");
        assert_eq!(detection.tags, vec!["food"]);
        assert_eq!(detection.nutrients.calories, 200);
        assert_eq!(detection.analysis_source, "azure_ai_vision");
    }

    #[tokio::test]
    async fn chat_reply_json_is_used() {
        let mut server = mockito::Server::new_async().await;
        let content = "```json\n{\"description\":\"Banku with tilapia\",\"nutrients\":{\"calories\":450,\"carbs\":65,\"protein\":40,\"fat\":7},\"diet_score\":120,\"immediate_recommendation\":\"Add greens\",\"balancing_advice\":\"Lighter dinner\",\"warning_level\":\"low\"}\n```";
        server
            .mock("POST", "/openai/deployments/meals/chat/completions")
            .match_query(mockito::Matcher::Any)
            .match_header("api-key", "ok")
            .with_status(200)
            .with_body(json!({ "choices": [{ "message": { "content": content } }] }).to_string())
            .create_async()
            .await;

        let detection = FoodDetection::mock();
        let analysis = vision(&server).analyze_nutrition(&detection, &[]).await;
        assert_eq!(analysis.description, "Banku with tilapia");
        assert_eq!(analysis.diet_score, 100);
    }

    #[test]
    fn fallback_flags_starch_for_diabetics() {
        let mut detection = FoodDetection::mock();
        detection.detected_food = "fufu".into();
        let analysis = fallback_analysis(&detection, &["Type 2 Diabetes".to_string()]);
        assert_eq!(analysis.diet_score, 55);
        assert_eq!(analysis.warning_level, "medium");
    }

    #[test]
    fn manual_log_keeps_given_score() {
        let (analysis, nutrients, score) = manual_log_analysis(Some(77));
        assert_eq!(score, 77);
        assert_eq!(analysis["nutrients"], nutrients);
        let (_, _, random) = manual_log_analysis(None);
        assert!((60..=95).contains(&random));
    }
}
