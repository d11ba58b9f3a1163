macro_rules! debug_eprintln {
    ($($arg:tt)*) => {
        if std::env::var("SNIFFER_DEBUG").is_ok() {
            eprintln!($($arg)*);
        }
    };
}

mod config;
mod error;
mod favorites;
mod parser;
mod permutations;
mod progress;
mod prompt;
mod providers;
mod search;
mod session;
mod upload;

use iced::{
    widget::{button, column, container, row, scrollable, text, text_input, text_input::Id},
    Element, Length, Task, Theme, Font, Subscription,
    time, clipboard,
    keyboard::{self, Key},
    event::{self, Event as IcedEvent},
    alignment, Padding,
    window,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::favorites::FavoritesStore;
use crate::parser::SearchResult;
use crate::providers::{Provider, ReqwestTransport};
use crate::search::{SearchClient, SearchMode};
use crate::session::{FinishedSearch, PendingSearch, Rejection, SearchSession, Settings, SettingsUpdate};

fn main() -> iced::Result {
    let config = config::Config::load();

    iced::application("Sniffer", App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window::Settings {
            size: iced::Size::new(config.window.width as f32, config.window.height as f32),
            position: window::Position::Centered,
            ..Default::default()
        })
        .default_font(Font::MONOSPACE)
        .run_with(App::new)
}

#[derive(Debug, Clone)]
enum Message {
    QueryChanged(String),
    Submit,
    ToggleMode,
    ToggleWildcard,
    ToggleEmails,
    ImagePathChanged(String),
    LoadImage,
    ClearImage,
    SearchFinished(FinishedSearch),
    AliasSearch(String),
    AddAllAliases,
    ToggleFavorite(SearchResult),
    ToggleFavoritesView,
    ToggleSettings,
    TryOtherProvider,
    DraftProvider(Provider),
    DraftGeminiKey(String),
    DraftXaiKey(String),
    DraftAgeConfirmed,
    SaveSettings,
    CopySummary,
    Tick,
    Escape,
}

/// Unsaved edits in the settings panel.
#[derive(Debug, Clone)]
struct SettingsDraft {
    provider: Provider,
    gemini_api_key: String,
    xai_api_key: String,
    age_confirmed: bool,
}

impl SettingsDraft {
    fn from_settings(settings: &Settings) -> Self {
        SettingsDraft {
            provider: settings.provider,
            gemini_api_key: settings.gemini_api_key.clone(),
            xai_api_key: settings.xai_api_key.clone(),
            age_confirmed: false,
        }
    }

    /// Grok needs the content warning ticked on every save.
    fn can_save(&self) -> bool {
        self.provider != Provider::Grok || self.age_confirmed
    }
}

struct App {
    config: config::Config,
    session: SearchSession,
    client: Arc<SearchClient>,
    cancel: Option<CancellationToken>,
    favorites: Option<FavoritesStore>,
    favorite_list: Vec<SearchResult>,
    show_favorites: bool,
    draft: Option<SettingsDraft>,
    image_path: String,
    loading_frame: usize,
    input_id: Id,
}

impl App {
    fn new() -> (Self, Task<Message>) {
        let config = config::Config::load();

        let client = SearchClient::with_config(Arc::new(ReqwestTransport::new()), &config.provider);
        let settings = Settings::from_config(&config.provider);

        let favorites = match FavoritesStore::open_default() {
            Ok(store) => Some(store),
            Err(e) => {
                eprintln!("Warning: Could not open favorites: {}", e);
                None
            }
        };
        let favorite_list = favorites
            .as_ref()
            .and_then(|store| store.list().ok())
            .unwrap_or_default();

        let input_id = Id::unique();

        let app = App {
            config,
            session: SearchSession::new(settings),
            client: Arc::new(client),
            cancel: None,
            favorites,
            favorite_list,
            show_favorites: false,
            draft: None,
            image_path: String::new(),
            loading_frame: 0,
            input_id: input_id.clone(),
        };

        (app, text_input::focus(input_id))
    }

    fn launch(&mut self, prepared: Result<PendingSearch, Rejection>) -> Task<Message> {
        match prepared {
            Ok(pending) => {
                progress::clear();
                let kind = if pending.append() { "follow-up" } else { "new" };
                progress::log(format!(
                    "Starting {} search with {}",
                    kind,
                    pending.provider().display_name()
                ));

                let cancel = CancellationToken::new();
                self.cancel = Some(cancel.clone());
                let client = self.client.clone();
                let timeout = Duration::from_secs(self.config.search.timeout_secs);

                Task::perform(
                    session::run_search(client, pending, timeout, cancel),
                    Message::SearchFinished,
                )
            }
            Err(rejection) => {
                if rejection.opens_settings() {
                    self.draft = Some(SettingsDraft::from_settings(&self.session.settings));
                }
                Task::none()
            }
        }
    }

    fn is_favorite(&self, uri: &str) -> bool {
        self.favorite_list.iter().any(|f| f.uri == uri)
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::QueryChanged(value) => {
                self.session.query = value;
                Task::none()
            }
            Message::Submit => {
                let prepared = self.session.start_search();
                self.launch(prepared)
            }
            Message::ToggleMode => {
                self.session.mode = self.session.mode.toggled();
                Task::none()
            }
            Message::ToggleWildcard => {
                self.session.use_wildcard = !self.session.use_wildcard;
                Task::none()
            }
            Message::ToggleEmails => {
                self.session.search_for_emails = !self.session.search_for_emails;
                Task::none()
            }
            Message::ImagePathChanged(value) => {
                self.image_path = value;
                Task::none()
            }
            Message::LoadImage => {
                let path = self.image_path.trim();
                if path.is_empty() {
                    return Task::none();
                }
                match upload::load_image(Path::new(path), self.config.search.max_image_bytes) {
                    Ok(image) => {
                        progress::log(format!("Attached {} image", image.mime_type));
                        self.session.image = Some(image);
                        self.session.error = None;
                    }
                    Err(e) => {
                        self.session.image = None;
                        self.session.error = Some(e.to_string());
                    }
                }
                Task::none()
            }
            Message::ClearImage => {
                self.session.image = None;
                self.image_path.clear();
                Task::none()
            }
            Message::SearchFinished(finished) => {
                self.cancel = None;
                self.session.apply_outcome(finished);
                Task::none()
            }
            Message::AliasSearch(alias) => match self.session.alias_search(&alias) {
                Some(prepared) => {
                    self.image_path.clear();
                    self.launch(prepared)
                }
                None => Task::none(),
            },
            Message::AddAllAliases => match self.session.add_all_aliases() {
                Some(prepared) => {
                    self.image_path.clear();
                    self.launch(prepared)
                }
                None => Task::none(),
            },
            Message::ToggleFavorite(result) => {
                if let Some(store) = &self.favorites {
                    match store.toggle(&result).and_then(|_| store.list()) {
                        Ok(list) => self.favorite_list = list,
                        Err(e) => eprintln!("Warning: Could not update favorites: {}", e),
                    }
                }
                Task::none()
            }
            Message::ToggleFavoritesView => {
                self.show_favorites = !self.show_favorites;
                Task::none()
            }
            Message::ToggleSettings => {
                self.draft = match self.draft {
                    Some(_) => None,
                    None => Some(SettingsDraft::from_settings(&self.session.settings)),
                };
                Task::none()
            }
            Message::TryOtherProvider => {
                let mut draft = SettingsDraft::from_settings(&self.session.settings);
                draft.provider = draft.provider.other();
                draft.age_confirmed = false;
                self.draft = Some(draft);
                Task::none()
            }
            Message::DraftProvider(provider) => {
                if let Some(draft) = &mut self.draft {
                    if draft.provider != provider {
                        draft.provider = provider;
                        draft.age_confirmed = false;
                    }
                }
                Task::none()
            }
            Message::DraftGeminiKey(value) => {
                if let Some(draft) = &mut self.draft {
                    draft.gemini_api_key = value;
                }
                Task::none()
            }
            Message::DraftXaiKey(value) => {
                if let Some(draft) = &mut self.draft {
                    draft.xai_api_key = value;
                }
                Task::none()
            }
            Message::DraftAgeConfirmed => {
                if let Some(draft) = &mut self.draft {
                    draft.age_confirmed = !draft.age_confirmed;
                }
                Task::none()
            }
            Message::SaveSettings => {
                if let Some(draft) = self.draft.take() {
                    if !draft.can_save() {
                        self.draft = Some(draft);
                        return Task::none();
                    }
                    self.session.settings.save(SettingsUpdate {
                        provider: draft.provider,
                        gemini_api_key: draft.gemini_api_key,
                        xai_api_key: draft.xai_api_key,
                        age_confirmed: draft.age_confirmed,
                    });
                    self.session.settings.write_to(&mut self.config.provider);
                    if let Err(e) = self.config.save() {
                        eprintln!("Warning: Could not save config: {:#}", e);
                    }
                    self.session.error = None;
                }
                Task::none()
            }
            Message::CopySummary => {
                clipboard::write(self.session.summary.clone())
            }
            Message::Tick => {
                if self.session.is_loading {
                    self.loading_frame = (self.loading_frame + 1) % 100;
                }
                Task::none()
            }
            Message::Escape => {
                if let Some(cancel) = self.cancel.take() {
                    progress::log("Search cancelled");
                    cancel.cancel();
                    Task::none()
                } else if self.draft.is_some() {
                    self.draft = None;
                    Task::none()
                } else {
                    iced::exit()
                }
            }
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        let timer = if self.session.is_loading {
            time::every(Duration::from_millis(80)).map(|_| Message::Tick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, _id| {
            if let IcedEvent::Keyboard(keyboard::Event::KeyPressed {
                key: Key::Named(keyboard::key::Named::Escape),
                ..
            }) = event
            {
                Some(Message::Escape)
            } else {
                None
            }
        });

        Subscription::batch([timer, events])
    }

    fn toggle<'a>(label: String, active: bool, message: Message) -> Element<'a, Message> {
        let style: fn(&Theme, button::Status) -> button::Style =
            if active { button::primary } else { button::secondary };
        button(text(label).size(13))
            .on_press(message)
            .style(style)
            .padding(6)
            .into()
    }

    fn result_row<'a>(&self, result: &'a SearchResult) -> Element<'a, Message> {
        let star = if self.is_favorite(&result.uri) { "[*]" } else { "[ ]" };
        let mut details = column![text(&result.title).size(15), text(&result.uri).size(12)];
        if let Some(thumb) = &result.thumbnail_url {
            details = details.push(text(format!("thumbnail: {}", thumb)).size(11));
        }
        row![
            button(text(star).size(13))
                .on_press(Message::ToggleFavorite(result.clone()))
                .style(button::text)
                .padding(4),
            details.spacing(2)
        ]
        .spacing(8)
        .into()
    }

    fn settings_view<'a>(&'a self, draft: &'a SettingsDraft) -> Element<'a, Message> {
        let providers = Provider::ALL.iter().fold(row![].spacing(6), |r, p| {
            r.push(Self::toggle(
                p.display_name().to_string(),
                draft.provider == *p,
                Message::DraftProvider(*p),
            ))
        });

        let mut panel = column![
            text("Settings").size(18),
            providers,
            text_input("Gemini API key", &draft.gemini_api_key)
                .on_input(Message::DraftGeminiKey)
                .secure(true)
                .padding(8),
            text_input("xAI API key", &draft.xai_api_key)
                .on_input(Message::DraftXaiKey)
                .secure(true)
                .padding(8),
        ]
        .spacing(10);

        if draft.provider == Provider::Grok {
            panel = panel.push(Self::toggle(
                "I am 18+ and accept adult results from Grok".to_string(),
                draft.age_confirmed,
                Message::DraftAgeConfirmed,
            ));
        }

        panel = panel.push(
            row![
                button(text("Save").size(14))
                    .on_press_maybe(draft.can_save().then_some(Message::SaveSettings))
                    .padding(8),
                button(text("Cancel").size(14))
                    .on_press(Message::ToggleSettings)
                    .style(button::secondary)
                    .padding(8),
            ]
            .spacing(8),
        );

        container(panel).padding(15).width(Length::Fill).into()
    }

    fn loading_view(&self) -> Element<'_, Message> {
        let loading_frames = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        let spinner_idx = self.loading_frame % loading_frames.len();

        let mut lines = column![
            text(loading_frames[spinner_idx]).size(32),
            text(format!(
                "Sniffing with {}... (Esc to cancel)",
                self.session.settings.provider.display_name()
            ))
            .size(15),
        ]
        .spacing(10)
        .align_x(alignment::Horizontal::Center);

        for entry in progress::recent(5) {
            lines = lines.push(text(format!("[{}] {}", entry.kind.label(), entry.text)).size(12));
        }

        container(lines)
            .width(Length::Fill)
            .height(Length::Fill)
            .align_x(alignment::Horizontal::Center)
            .align_y(alignment::Vertical::Center)
            .into()
    }

    fn results_view(&self) -> Element<'_, Message> {
        let session = &self.session;
        let mut body = column![].spacing(12).padding(15);

        if let Some(error) = &session.error {
            let other = session.settings.provider.other();
            body = body.push(
                row![
                    text(error).size(14).style(text::danger),
                    button(text(format!("[Try {}]", other.display_name())).size(12))
                        .on_press(Message::TryOtherProvider)
                        .style(button::text),
                ]
                .spacing(8),
            );
        }

        if self.show_favorites {
            body = body.push(text(format!("Favorites ({})", self.favorite_list.len())).size(18));
            for fav in &self.favorite_list {
                body = body.push(self.result_row(fav));
            }
            return scrollable(body).height(Length::Fill).into();
        }

        if !session.has_searched {
            return scrollable(body).height(Length::Fill).into();
        }

        if !session.summary.is_empty() {
            body = body.push(text(&session.summary).size(15));
        }

        if !session.aliases.is_empty() {
            let aliases = session.aliases.iter().fold(row![].spacing(6), |r, alias| {
                r.push(
                    button(text(alias).size(13))
                        .on_press(Message::AliasSearch(alias.clone()))
                        .style(button::secondary)
                        .padding(4),
                )
            });
            body = body.push(
                column![
                    row![
                        text("Aliases").size(16),
                        button(text("[Add all]").size(12))
                            .on_press(Message::AddAllAliases)
                            .style(button::text),
                    ]
                    .spacing(8),
                    aliases.wrap(),
                ]
                .spacing(6),
            );
        }

        body = body.push(text(format!("Results ({})", session.results.len())).size(16));
        for result in &session.results {
            body = body.push(self.result_row(result));
        }

        if !session.community_links.is_empty() {
            body = body.push(text("Community").size(16));
            for link in &session.community_links {
                body = body.push(self.result_row(link));
            }
        }

        scrollable(body).height(Length::Fill).into()
    }

    fn view(&self) -> Element<'_, Message> {
        let session = &self.session;

        let input = text_input("Creator name, username, or work title...", &session.query)
            .on_input(Message::QueryChanged)
            .on_submit(Message::Submit)
            .padding(15)
            .size(18)
            .id(self.input_id.clone());

        let mode_label = match session.mode {
            SearchMode::Creator => "Mode: creator",
            SearchMode::Work => "Mode: work",
        };
        let provider = session.settings.provider;
        let toggles = row![
            Self::toggle(mode_label.to_string(), true, Message::ToggleMode),
            Self::toggle("Wildcard".to_string(), session.use_wildcard, Message::ToggleWildcard),
            Self::toggle("Emails".to_string(), session.search_for_emails, Message::ToggleEmails),
            Self::toggle(
                format!("Provider: {} (Settings)", provider.display_name()),
                self.draft.is_some(),
                Message::ToggleSettings,
            ),
            Self::toggle(
                format!("Favorites ({})", self.favorite_list.len()),
                self.show_favorites,
                Message::ToggleFavoritesView,
            ),
        ]
        .spacing(6);

        let image_status = match &session.image {
            Some(image) => format!("Attached: {}", image.mime_type),
            None => String::from("No image"),
        };
        let image_row = row![
            text_input("Path to a reference image (optional)", &self.image_path)
                .on_input(Message::ImagePathChanged)
                .on_submit(Message::LoadImage)
                .padding(8)
                .size(13),
            button(text("Attach").size(13)).on_press(Message::LoadImage).padding(6),
            button(text("Clear").size(13))
                .on_press_maybe(session.image.as_ref().map(|_| Message::ClearImage))
                .style(button::secondary)
                .padding(6),
            text(image_status).size(12),
        ]
        .spacing(6)
        .align_y(alignment::Vertical::Center);

        let output: Element<Message> = if let Some(draft) = &self.draft {
            self.settings_view(draft)
        } else if session.is_loading {
            self.loading_view()
        } else {
            self.results_view()
        };

        let mut content_column = column![input, toggles, image_row, output]
            .spacing(10)
            .padding(10);

        if !session.summary.is_empty() && !session.is_loading && self.draft.is_none() {
            let copy_button = container(
                button(text("[Copy summary]").size(14))
                    .on_press(Message::CopySummary)
                    .padding(10)
            )
            .width(Length::Fill)
            .align_x(alignment::Horizontal::Right)
            .padding(Padding::from([10, 10]));

            content_column = content_column.push(copy_button);
        }

        container(content_column)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }
}
