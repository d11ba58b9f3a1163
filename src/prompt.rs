//! Investigation briefs sent to the backends.
//!
//! Gemini briefs ask for free-form narrative ending in a fenced JSON block;
//! Grok briefs demand a single bare JSON object. All builders are pure and
//! produce a usable brief even for an empty query.

use crate::permutations::UsernamePermutations;
use crate::providers::Provider;
use crate::search::{SearchMode, SearchQuery};

/// Domains used to guess mailbox names when wildcard expansion is on.
pub const EMAIL_DOMAINS: [&str; 6] = [
    "gmail.com",
    "yahoo.com",
    "outlook.com",
    "hotmail.com",
    "aol.com",
    "protonmail.com",
];

const GEMINI_TEXT_PLATFORMS: [&str; 19] = [
    "instagram.com",
    "tiktok.com",
    "x.com",
    "twitter.com",
    "picsart.com",
    "threads.net",
    "deviantart.com",
    "artstation.com",
    "patreon.com",
    "reddit.com",
    "tumblr.com",
    "behance.net",
    "linktr.ee",
    "ko-fi.com",
    "fansly.com",
    "onlyfans.com",
    "youtube.com",
    "facebook.com",
    "pinterest.com",
];

const IMAGE_PLATFORMS: [&str; 11] = [
    "instagram.com",
    "tiktok.com",
    "x.com",
    "twitter.com",
    "picsart.com",
    "threads.net",
    "deviantart.com",
    "artstation.com",
    "patreon.com",
    "reddit.com",
    "tumblr.com",
];

const GROK_PLATFORM_TIERS: &str = "     - **Primary**: Instagram, TikTok, X.com/Twitter, Picsart, Threads.net, DeviantArt, ArtStation
     - **Secondary**: Reddit, Tumblr, Facebook, Pinterest, Behance, Pixiv, Imgur, Fur Affinity
     - **Monetization**: Patreon, Ko-fi, Gumroad, Substack, Medium, Dribbble";

const GROK_ADULT_PLATFORM_TIERS: &str = "
     - **Monetization & Premium Content**: OnlyFans, Fansly, Patreon (check for adult content), Gumroad (check for adult content), SubscribeStar, Fanvue, Loyalfans, MYM.fans, iFans, ManyVids, Chaturbate, MyFreeCams.
     - **Video Platforms**: Pornhub, XVideos, XHamster, SpankBang.
     - **Community Hubs & Forums**: Reddit (NSFW subreddits), Kemono.party, coomer.party, yiff.party, F-list.net.
     - **Imageboards & Boorus**: e-hentai.org, sankakucomplex.com, danbooru.donmai.us, gelbooru.com, rule34.xxx, e621.net, derpibooru.org.";

const GROK_ADULT_DIRECTIVE: &str = "*   **PRIORITY DIRECTIVE: Adult Content Investigation:** Since the user has verified their age, you MUST prioritize a thorough investigation of adult content platforms. This is a primary objective.";

const GROK_TEXT_SCHEMA: &str = r#"{
  "summary": "Your text summary of the investigation.",
  "aliases": ["list", "of", "aliases"],
  "results": [
    {
      "uri": "https://... or mailto:...",
      "title": "Title of the content or Email Address",
      "thumbnailUrl": "https://... direct image link (optional)"
    }
  ],
  "communityLinks": [
     {
      "uri": "https://... link to a discussion",
      "title": "Title of the discussion"
    }
  ]
}"#;

const GROK_IMAGE_SCHEMA: &str = r#"    {
      "summary": "Your text summary of the investigation. If no creator is found, state it here.",
      "aliases": [],
      "results": [],
      "communityLinks": []
    }"#;

fn bullet_code_list<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items
        .into_iter()
        .map(|item| format!("- `{item}`"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn bullet_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn permutation_list(permutations: &UsernamePermutations) -> String {
    bullet_code_list(permutations.iter().map(String::as_str))
}

/// Every permutation at every common mail domain, permutation-major.
pub fn email_candidates(permutations: &UsernamePermutations) -> Vec<String> {
    permutations
        .iter()
        .flat_map(|name| EMAIL_DOMAINS.iter().map(move |domain| format!("{name}@{domain}")))
        .collect()
}

fn email_candidate_list(permutations: &UsernamePermutations) -> String {
    let candidates = email_candidates(permutations);
    bullet_code_list(candidates.iter().map(String::as_str))
}

fn search_target(query: &SearchQuery, work_follow_up: &str) -> String {
    match query.mode {
        SearchMode::Work => format!(
            "The user is searching for a creative work titled '{}'. {}",
            query.text, work_follow_up
        ),
        SearchMode::Creator => format!(
            "The user is searching for a creator with the name or alias '{}'.",
            query.text
        ),
    }
}

/// Email guesses are only listed when wildcard expansion is also on.
fn email_instructions(
    query: &SearchQuery,
    permutations: &UsernamePermutations,
    base: &str,
    candidates_intro: &str,
) -> String {
    if !query.search_for_emails {
        return String::new();
    }
    let mut instructions = format!("\n*   **Email Search:** {base}");
    if query.use_wildcard {
        instructions.push_str(&format!(
            " {candidates_intro}\n{}",
            email_candidate_list(permutations)
        ));
    }
    instructions
}

pub fn gemini_text_brief(query: &SearchQuery, permutations: &UsernamePermutations) -> String {
    let target = search_target(
        query,
        "Your first step is to identify the original creator of that work, then use their name(s) for the investigation.",
    );
    let emails = email_instructions(
        query,
        permutations,
        "You must also search for any publicly listed email addresses associated with the creator. Look for them in profile bios, \"about\" pages, and contact sections.",
        "As part of this, you MUST also actively search for the following potential email addresses:",
    );

    format!(
        "You are a world-class Digital Content Investigator.

**INVESTIGATION BRIEF:**

*   **Objective:** Find all public online profiles, content, and aliases for a creator.
*   **Search Target:** {target}
*   **Known Usernames/Aliases:** Your primary investigation must focus on this definitive list of known and potential usernames:
    {permutations}
*   **Key Platforms to Investigate:** Prioritize your search on these platforms, but do not limit yourself if you find strong leads elsewhere:
    {platforms}
{emails}

**REPORTING INSTRUCTIONS:**
Compile all your findings into a comprehensive summary. Your final response MUST end with a single, clean JSON object in a markdown code block. Do not include any text after the JSON block.
- `summary`: Your detailed text summary of the investigation, including your search process and findings.
- `aliases`: An array of ALL new aliases you discovered.
- `results`: An array of direct links to profiles, content, and any found email addresses (formatted as \"mailto:email@example.com\").
",
        permutations = permutation_list(permutations),
        platforms = bullet_list(&GEMINI_TEXT_PLATFORMS),
    )
}

pub fn gemini_image_brief(hint: &str, permutations: &UsernamePermutations) -> String {
    let hint = if hint.trim().is_empty() {
        "The user has not provided any text hint. Your analysis must be based solely on the provided image.".to_string()
    } else {
        format!("The user has provided a text hint: '{hint}'. Use this to guide your investigation.")
    };

    format!(
        "You are a world-class Digital Art Investigator.

**INVESTIGATION BRIEF:**

*   **Mission:** Analyze the provided image to identify the original creator and then find their complete online presence.
*   **Image Analysis:** Perform deep analysis of the image. Use OCR to extract ALL visible text (usernames are critical clues) and use reverse image search to find where it's posted.
*   **User Hint:** {hint}
*   **Initial Aliases:** Based on your analysis and the user hint, you will investigate all permutations of found names. The initial list to investigate is:
    {permutations}
*   **Key Platforms:** For EACH potential username, investigate their presence on these sites:
    {platforms}

**REPORTING INSTRUCTIONS:**
After completing your investigation, compile all discovered profile links and aliases. Your response must end with a single, clean JSON object in a markdown code block.
- If you cannot identify a creator, the summary must state this, and 'aliases' and 'results' MUST be empty arrays.
",
        permutations = permutation_list(permutations),
        platforms = bullet_list(&IMAGE_PLATFORMS),
    )
}

pub fn grok_text_brief(
    query: &SearchQuery,
    age_verified: bool,
    permutations: &UsernamePermutations,
) -> String {
    let target = search_target(query, "Your first step is to identify the original creator.");
    let (directive, adult_platforms) = if age_verified {
        (GROK_ADULT_DIRECTIVE, GROK_ADULT_PLATFORM_TIERS)
    } else {
        ("", "")
    };
    let emails = email_instructions(
        query,
        permutations,
        "You must also search for any publicly listed email addresses.",
        "As part of this, actively search for these potential emails:",
    );

    format!(
        "You are Grok, a Digital Content Investigator.

**INVESTIGATION BRIEF:**

*   **Objective:** Conduct a comprehensive web search to find all public online profiles, content, and aliases for a creator.
*   **Search Target:** {target}
{directive}
*   **Known Usernames/Aliases:** Your primary investigation must use this definitive list of usernames:
    {permutations}
*   **Key Platforms to Investigate:**
{GROK_PLATFORM_TIERS}{adult_platforms}
{emails}

**REPORTING INSTRUCTIONS (Strict & Mandatory JSON Mode):**
Your entire response MUST be a single, valid JSON object. Do NOT output any other text or explanation.
{GROK_TEXT_SCHEMA}
",
        permutations = permutation_list(permutations),
    )
}

pub fn grok_image_brief(hint: &str, permutations: &UsernamePermutations) -> String {
    let hint = if hint.trim().is_empty() {
        "The user has not provided any text hint.".to_string()
    } else {
        format!("The user has provided a text hint along with the image: '{hint}'.")
    };

    format!(
        "You are Grok, a Digital Art Investigator.

**INVESTIGATION BRIEF:**

*   **Mission:** Identify the creator in the image and find their online presence.
*   **Image Analysis:** Perform OCR on the image to extract ALL text. Use reverse image search to find where it's posted.
*   **User Hint:** {hint}
*   **Initial Aliases:** Based on your analysis, investigate all permutations of found names. Your initial list to investigate is:
    {permutations}
*   **Key Platforms:** For EACH potential username, investigate their presence on these sites:
    {platforms}

**REPORTING INSTRUCTIONS (Strict & Mandatory JSON Mode):**
Your entire response MUST be a single, valid JSON object. Do NOT output any other text, explanation, or markdown formatting. The JSON object must conform to this structure:
{GROK_IMAGE_SCHEMA}
",
        permutations = permutation_list(permutations),
        platforms = bullet_list(&IMAGE_PLATFORMS),
    )
}

/// Picks the builder for `provider` and whether an image was attached.
pub fn build_brief(
    provider: Provider,
    query: &SearchQuery,
    age_verified: bool,
    permutations: &UsernamePermutations,
) -> String {
    match (provider, query.image.is_some()) {
        (Provider::Gemini, false) => gemini_text_brief(query, permutations),
        (Provider::Gemini, true) => gemini_image_brief(&query.text, permutations),
        (Provider::Grok, false) => grok_text_brief(query, age_verified, permutations),
        (Provider::Grok, true) => grok_image_brief(&query.text, permutations),
    }
}
