//! Notification rendering for classified events.
//!
//! Every payload type implements [`Render`]. The trait defaults are the base
//! behaviour (no headline, no attachments); kinds override what they show.

mod context;

pub use context::{EventContext, GITHUB_WEB_BASE};

use crate::{
    classify::{
        Classified, IssueCommentEvent, IssuesEvent, PullRequestEvent,
        PullRequestReviewCommentEvent, PushEvent, TypedEvent,
    },
    formatting::{
        escape_mrkdwn, first_line, ref_short_name, short_sha, slack_link, truncate_lines, unit,
    },
};

/// Comment bodies are cut to this many lines.
const COMMENT_PREVIEW_LINES: usize = 3;

/// One attachment block below the headline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub text: String,
    /// Render `text` as mrkdwn.
    pub markdown: bool,
}

impl Attachment {
    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: true,
        }
    }
}

/// Self-contained notification, independent of the delivery backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedNotification {
    pub headline: String,
    pub attachments: Vec<Attachment>,
    pub actor_name: String,
    pub actor_icon: String,
}

pub trait Render {
    fn headline(&self, _ctx: &EventContext<'_>) -> String {
        String::new()
    }

    fn attachments(&self, _ctx: &EventContext<'_>) -> Vec<Attachment> {
        Vec::new()
    }
}

/// Render a classified event.
pub fn render(classified: &Classified) -> RenderedNotification {
    let ctx = EventContext::new(&classified.envelope);
    RenderedNotification {
        headline: classified.event.headline(&ctx),
        attachments: classified.event.attachments(&ctx),
        actor_name: classified.envelope.actor.login.clone(),
        actor_icon: classified.envelope.actor.avatar_url.clone(),
    }
}

impl TypedEvent {
    fn as_render(&self) -> &dyn Render {
        match self {
            TypedEvent::Push(e) => e,
            TypedEvent::IssueComment(e) => e,
            TypedEvent::Issues(e) => e,
            TypedEvent::PullRequest(e) => e,
            TypedEvent::PullRequestReviewComment(e) => e,
        }
    }
}

impl Render for TypedEvent {
    fn headline(&self, ctx: &EventContext<'_>) -> String {
        self.as_render().headline(ctx)
    }

    fn attachments(&self, ctx: &EventContext<'_>) -> Vec<Attachment> {
        self.as_render().attachments(ctx)
    }
}

impl Render for PushEvent {
    fn headline(&self, ctx: &EventContext<'_>) -> String {
        let branch = ref_short_name(&self.git_ref);
        format!(
            "*{} pushed to {} at {}*",
            ctx.user_link(),
            ctx.tree_link(branch),
            ctx.repo_link()
        )
    }

    fn attachments(&self, ctx: &EventContext<'_>) -> Vec<Attachment> {
        if self.commits.is_empty() {
            return Vec::new();
        }

        let lines: Vec<String> = self
            .commits
            .iter()
            .map(|c| {
                format!(
                    "{} {}",
                    slack_link(&ctx.commit_url(&c.sha), short_sha(&c.sha)),
                    escape_mrkdwn(first_line(&c.message))
                )
            })
            .collect();

        vec![Attachment::markdown(lines.join("\n"))]
    }
}

impl Render for IssueCommentEvent {
    fn headline(&self, ctx: &EventContext<'_>) -> String {
        let target = if self.issue.is_pull_request() {
            "pull request"
        } else {
            "issue"
        };
        comment_headline(
            ctx,
            target,
            self.issue.number,
            &self.comment.html_url,
            &self.comment.body,
        )
    }
}

impl Render for PullRequestReviewCommentEvent {
    fn headline(&self, ctx: &EventContext<'_>) -> String {
        comment_headline(
            ctx,
            "pull request",
            self.pull_request.number,
            &self.comment.html_url,
            &self.comment.body,
        )
    }
}

impl Render for IssuesEvent {
    fn headline(&self, ctx: &EventContext<'_>) -> String {
        let link = slack_link(&self.issue.html_url, &ctx.issue_ref(self.issue.number));
        format!(
            "*{} {} issue {}*\n{}",
            ctx.user_link(),
            self.action,
            link,
            escape_mrkdwn(&self.issue.title)
        )
    }
}

impl Render for PullRequestEvent {
    fn headline(&self, ctx: &EventContext<'_>) -> String {
        let pr = &self.pull_request;
        let link = slack_link(&pr.html_url, &ctx.issue_ref(self.pr_number()));
        format!(
            "*{} {} pull request {}*\n{}",
            ctx.user_link(),
            self.action,
            link,
            escape_mrkdwn(&pr.title)
        )
    }

    fn attachments(&self, _ctx: &EventContext<'_>) -> Vec<Attachment> {
        let pr = &self.pull_request;
        let text = format!(
            "*{}* {} with *{}* {} and *{}* {}",
            pr.commits,
            unit(pr.commits, "commit", "commits"),
            pr.additions,
            unit(pr.additions, "addition", "additions"),
            pr.deletions,
            unit(pr.deletions, "deletion", "deletions"),
        );
        vec![Attachment::markdown(text)]
    }
}

fn comment_headline(
    ctx: &EventContext<'_>,
    target: &str,
    number: u64,
    comment_url: &str,
    body: &str,
) -> String {
    let link = slack_link(comment_url, &ctx.issue_ref(number));
    format!(
        "*{} commented on {target} {link}*\n{}",
        ctx.user_link(),
        escape_mrkdwn(&truncate_lines(body, COMMENT_PREVIEW_LINES))
    )
}
