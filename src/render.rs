use askama::Template;
use chrono::{DateTime, NaiveDate, Utc};
use pulldown_cmark::{html, Parser};

use crate::normalize::PostKind;
use crate::source::{FetchResult, SourceData};
use crate::sources::hackernews::HnPost;
use crate::sources::nitter::NitterPost;
use crate::sources::readwise::Highlight;
use crate::sources::reddit::RedditPost;
use crate::sources::unsplash::UnsplashImage;
use crate::sources::weather::WeatherData;

pub const EXCERPT_MAX_CHARS: usize = 280;

const LEAD_CANDIDATES: usize = 5;
const LEAD_SENTENCES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub html: String,
    pub text: String,
}

pub fn subject(edition: i64, date: NaiveDate) -> String {
    format!("Burrow Digest #{} ({})", edition, date.format("%b %-d, %Y"))
}

/// Everything the templates need, already flattened into display strings.
#[derive(Debug, Clone)]
pub struct DigestView {
    pub date: String,
    pub edition: i64,
    pub header: Option<ImageView>,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone)]
pub struct Section {
    pub index: usize,
    pub alternate: bool,
    pub name: String,
    pub body: SectionBody,
}

#[derive(Debug, Clone)]
pub enum SectionBody {
    Failed(String),
    Weather(WeatherView),
    Highlight(HighlightView),
    HackerNews(Vec<StoryView>),
    Reddit(RedditView),
    Opinion(Vec<PostView>),
    Empty,
}

#[derive(Debug, Clone)]
pub struct ImageView {
    pub url: String,
    pub alt: String,
    pub photographer_name: String,
    pub photographer_url: String,
    pub query: String,
}

#[derive(Debug, Clone)]
pub struct WeatherView {
    pub location: String,
    pub icon: &'static str,
    pub description: String,
    pub temperature: String,
    pub high: String,
    pub low: String,
    pub precipitation: String,
}

#[derive(Debug, Clone)]
pub struct HighlightView {
    pub text: String,
    pub text_html: String,
    pub book_title: String,
    pub book_author: String,
    pub source_url: String,
}

#[derive(Debug, Clone)]
pub struct StoryView {
    pub title: String,
    pub url: String,
    pub comments_url: String,
    pub points: i64,
    pub num_comments: i64,
    pub author: String,
}

#[derive(Debug, Clone)]
pub struct RedditView {
    pub lead: RedditPostView,
    pub sidebar: Vec<RedditPostView>,
}

#[derive(Debug, Clone)]
pub struct RedditPostView {
    pub title: String,
    pub url: String,
    pub subreddit: String,
    pub score: i64,
    pub num_comments: i64,
    pub excerpt: String,
    pub excerpt_html: String,
}

#[derive(Debug, Clone)]
pub struct PostView {
    pub username: String,
    pub avatar_url: String,
    pub text: String,
    pub link: String,
    pub time_ago: String,
    pub images: Vec<String>,
    pub label: &'static str,
}

#[derive(Template)]
#[template(path = "digest.html")]
struct HtmlDigest<'a> {
    view: &'a DigestView,
}

#[derive(Template)]
#[template(path = "digest.txt")]
struct TextDigest<'a> {
    view: &'a DigestView,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(
        &self,
        results: &[FetchResult],
        edition: i64,
        date: NaiveDate,
    ) -> anyhow::Result<RenderedEmail> {
        self.render_at(results, edition, date, Utc::now())
    }

    /// Render with an explicit clock for relative timestamps.
    pub fn render_at(
        &self,
        results: &[FetchResult],
        edition: i64,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RenderedEmail> {
        let view = DigestView::build(results, edition, date, now);
        Ok(RenderedEmail {
            html: HtmlDigest { view: &view }.render()?,
            text: TextDigest { view: &view }.render()?,
        })
    }
}

impl DigestView {
    /// Sections follow result order. Image payloads become the header instead.
    pub fn build(
        results: &[FetchResult],
        edition: i64,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        let mut header = None;
        let mut sections = Vec::new();

        for result in results {
            let body = match &result.outcome {
                Err(e) => SectionBody::Failed(e.to_string()),
                Ok(SourceData::Image(image)) => {
                    header.get_or_insert_with(|| image_view(image));
                    continue;
                }
                Ok(SourceData::Weather(weather)) => SectionBody::Weather(weather_view(weather)),
                Ok(SourceData::Highlights(highlights)) => match highlights.first() {
                    Some(h) => SectionBody::Highlight(highlight_view(h)),
                    None => SectionBody::Empty,
                },
                Ok(SourceData::HackerNews(posts)) if !posts.is_empty() => {
                    SectionBody::HackerNews(posts.iter().map(story_view).collect())
                }
                Ok(SourceData::Reddit(posts)) => match reddit_view(posts) {
                    Some(view) => SectionBody::Reddit(view),
                    None => SectionBody::Empty,
                },
                Ok(SourceData::Opinion(posts)) if !posts.is_empty() => {
                    SectionBody::Opinion(posts.iter().map(|p| post_view(p, now)).collect())
                }
                Ok(SourceData::HackerNews(_)) | Ok(SourceData::Opinion(_)) => SectionBody::Empty,
            };

            let index = sections.len();
            sections.push(Section {
                index,
                alternate: index % 2 == 1,
                name: result.name.clone(),
                body,
            });
        }

        Self {
            date: date.format("%A, %B %-d, %Y").to_string(),
            edition,
            header,
            sections,
        }
    }
}

fn image_view(image: &UnsplashImage) -> ImageView {
    ImageView {
        url: image.url.clone(),
        alt: if image.alt_description.is_empty() {
            image.query.clone()
        } else {
            image.alt_description.clone()
        },
        photographer_name: image.photographer_name.clone(),
        photographer_url: image.photographer_url.clone(),
        query: image.query.clone(),
    }
}

fn weather_view(weather: &WeatherData) -> WeatherView {
    WeatherView {
        location: weather.location.clone(),
        icon: weather_icon(weather.weather_code),
        description: weather.description.clone(),
        temperature: format!("{:.0}°C", weather.temperature),
        high: format!("{:.0}°", weather.high_temp),
        low: format!("{:.0}°", weather.low_temp),
        precipitation: format!("{:.0}%", weather.precipitation_chance),
    }
}

fn highlight_view(highlight: &Highlight) -> HighlightView {
    let text = highlight.text.trim().to_string();
    HighlightView {
        text_html: markdown_html(&text),
        text,
        book_title: highlight.book_title.clone(),
        book_author: highlight.book_author.clone(),
        source_url: highlight.source_url.clone().unwrap_or_default(),
    }
}

fn story_view(post: &HnPost) -> StoryView {
    StoryView {
        title: post.title.clone(),
        url: post.link(),
        comments_url: post.comments_url(),
        points: post.points,
        num_comments: post.num_comments,
        author: post.author.clone(),
    }
}

fn reddit_post_view(post: &RedditPost) -> RedditPostView {
    let excerpt = excerpt(&post.selftext, LEAD_SENTENCES);
    RedditPostView {
        title: post.title.clone(),
        url: post.full_permalink(),
        subreddit: post.subreddit.clone(),
        score: post.score,
        num_comments: post.num_comments,
        excerpt_html: markdown_html(&excerpt),
        excerpt,
    }
}

fn reddit_view(posts: &[RedditPost]) -> Option<RedditView> {
    let lead = reddit_lead(posts)?;
    Some(RedditView {
        lead: reddit_post_view(&posts[lead]),
        sidebar: posts
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != lead)
            .map(|(_, post)| reddit_post_view(post))
            .collect(),
    })
}

fn post_view(post: &NitterPost, now: DateTime<Utc>) -> PostView {
    PostView {
        username: post.username.clone(),
        avatar_url: post.avatar_url.clone(),
        text: post.text.clone(),
        link: post.link.clone(),
        time_ago: post.published.map(|t| time_ago(t, now)).unwrap_or_default(),
        images: post.images.clone(),
        label: match post.kind {
            PostKind::Original => "",
            PostKind::Repost => "Repost",
            PostKind::Reply => "Reply",
        },
    }
}

/// Render CommonMark to an HTML fragment. Inline HTML passes through.
pub fn markdown_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3 / 2);
    html::push_html(&mut out, Parser::new(s));
    out.trim_end().to_string()
}

/// Index of the featured post: the first of the top five with body text,
/// otherwise the very first post.
pub fn reddit_lead(posts: &[RedditPost]) -> Option<usize> {
    if posts.is_empty() {
        return None;
    }
    posts
        .iter()
        .take(LEAD_CANDIDATES)
        .position(RedditPost::is_self_post)
        .or(Some(0))
}

/// First `max_sentences` sentences of `s`, capped at [`EXCERPT_MAX_CHARS`].
pub fn excerpt(s: &str, max_sentences: usize) -> String {
    let mut remaining = s.trim();
    let mut sentences: Vec<&str> = Vec::new();

    while sentences.len() < max_sentences && !remaining.is_empty() {
        let end = [". ", "! ", "? "]
            .iter()
            .filter_map(|sep| remaining.find(sep))
            .min();
        match end {
            Some(idx) => {
                sentences.push(&remaining[..=idx]);
                remaining = remaining[idx + 1..].trim();
            }
            None => {
                sentences.push(remaining);
                break;
            }
        }
    }

    let result = sentences.join(" ");
    if result.chars().count() > EXCERPT_MAX_CHARS {
        let cut: String = result.chars().take(EXCERPT_MAX_CHARS - 3).collect();
        format!("{}...", cut)
    } else {
        result
    }
}

pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - then;
    if elapsed.num_minutes() < 1 {
        "now".to_string()
    } else if elapsed.num_hours() < 1 {
        format!("{}m", elapsed.num_minutes())
    } else if elapsed.num_hours() < 24 {
        format!("{}h", elapsed.num_hours())
    } else {
        format!("{}d", elapsed.num_days())
    }
}

pub fn weather_icon(code: i32) -> &'static str {
    match code {
        0 => "☀️",
        1..=3 => "⛅",
        4..=48 => "🌫️",
        49..=57 => "🌦️",
        58..=67 => "🌧️",
        68..=77 => "❄️",
        78..=82 => "🌧️",
        83..=86 => "🌨️",
        87..=99 => "⛈️",
        _ => "?",
    }
}
