use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use realmwire::prelude::*;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

const CMSG_MESSAGECHAT: Opcode = Opcode(0x0095);
const SMSG_MESSAGECHAT: Opcode = Opcode(0x0096);
const CMSG_TEXT_EMOTE: Opcode = Opcode(0x0104);
const SMSG_TEXT_EMOTE: Opcode = Opcode(0x0105);
const CMSG_CHAT_HISTORY: Opcode = Opcode(0x0106);
const CMSG_PING: Opcode = Opcode(0x01DC);
const SMSG_PONG: Opcode = Opcode(0x01DD);
const SMSG_AUTH_RESPONSE: Opcode = Opcode(0x01EE);

const AUTH_OK: u8 = 0x0C;
const AUTH_UNKNOWN_ACCOUNT: u8 = 0x15;

const MAX_LINE: usize = 255;
const HISTORY_LEN: usize = 32;
const EMOTES: &[(u32, &str)] = &[(1, "waves"), (2, "bows"), (3, "cheers"), (4, "dances")];

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// `chat-relay [config.json]`
///
/// ```json
/// { "server": { "bind_addr": "0.0.0.0:8085" }, "accounts": { "1": "thrall" } }
/// ```
#[derive(Deserialize)]
#[serde(default)]
struct DemoConfig {
    server: ServerConfig,
    accounts: HashMap<u64, String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            accounts: HashMap::from([(1, "thrall".into()), (2, "jaina".into())]),
        }
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

struct ChatWorld {
    names: HashMap<u64, String>,
    history: Mutex<VecDeque<(u64, String)>>,
}

impl ChatWorld {
    fn new(names: HashMap<u64, String>) -> Self {
        Self {
            names,
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LEN)),
        }
    }

    fn name_of(&self, actor: ActorId) -> &str {
        self.names.get(&actor.0).map(String::as_str).unwrap_or("unknown")
    }

    fn record(&self, actor: ActorId, line: String) -> Result<(), HandlerError> {
        let mut history = self
            .history
            .lock()
            .map_err(|_| HandlerError::Rejected("chat history poisoned".into()))?;
        if history.len() == HISTORY_LEN {
            history.pop_front();
        }
        history.push_back((actor.0, line));
        Ok(())
    }
}

fn chat_line(speaker: u64, name: &str, text: &str) -> Message {
    let mut w = PacketWriter::new(SMSG_MESSAGECHAT);
    w.write_guid(ObjectGuid(speaker), GuidForm::Packed)
        .write_string(name)
        .write_string(text);
    w.finish()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn ping(
    _world: &ChatWorld,
    _session: &Session,
    request: &mut PacketReader,
) -> Result<Vec<Message>, HandlerError> {
    let seq = request.read_u32()?;
    let mut pong = PacketWriter::new(SMSG_PONG);
    pong.write_u32(seq);
    Ok(vec![pong.finish()])
}

fn say(
    world: &ChatWorld,
    session: &Session,
    request: &mut PacketReader,
) -> Result<Vec<Message>, HandlerError> {
    let actor = session
        .actor()
        .ok_or_else(|| HandlerError::Rejected("no actor".into()))?;
    let text = request.read_string()?;
    if text.is_empty() {
        return Ok(Vec::new());
    }
    // The stock client caps a line at 255 bytes.
    if text.len() > MAX_LINE {
        return Err(HandlerError::Violation(format!(
            "{}-byte chat line",
            text.len()
        )));
    }
    world.record(actor, text.clone())?;
    Ok(vec![chat_line(actor.0, world.name_of(actor), &text)])
}

fn text_emote(
    world: &ChatWorld,
    session: &Session,
    request: &mut PacketReader,
) -> Result<Vec<Message>, HandlerError> {
    let actor = session
        .actor()
        .ok_or_else(|| HandlerError::Rejected("no actor".into()))?;
    let emote = request.read_u32()?;
    let target = request.read_guid(GuidForm::Fixed)?;
    let Some((_, verb)) = EMOTES.iter().find(|(id, _)| *id == emote) else {
        return Err(HandlerError::Rejected(format!("unknown emote {emote}")));
    };

    let mut w = PacketWriter::new(SMSG_TEXT_EMOTE);
    w.write_guid(ObjectGuid(actor.0), GuidForm::Packed)
        .write_u32(emote)
        .write_string(&format!("{} {verb}", world.name_of(actor)))
        .write_guid(target, GuidForm::Packed);
    Ok(vec![w.finish()])
}

fn chat_history(
    world: &ChatWorld,
    _session: &Session,
    _request: &mut PacketReader,
) -> Result<Vec<Message>, HandlerError> {
    let history = world
        .history
        .lock()
        .map_err(|_| HandlerError::Rejected("chat history poisoned".into()))?;
    Ok(history
        .iter()
        .map(|(speaker, text)| {
            chat_line(*speaker, world.name_of(ActorId(*speaker)), text)
        })
        .collect())
}

fn dispatch_table() -> Result<DispatchTable<ChatWorld>, DispatchError> {
    Ok(DispatchTable::builder()
        .register(CMSG_PING, "ping", Access::Public, ping)?
        .register(CMSG_MESSAGECHAT, "say", Access::Authenticated, say)?
        .register(CMSG_TEXT_EMOTE, "text_emote", Access::Authenticated, text_emote)?
        .register(CMSG_CHAT_HISTORY, "chat_history", Access::Authenticated, chat_history)?
        .build())
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Accepts `u64 account` + `u32 proof` where `proof == seed ^ account`
/// and the account is listed in the config.
struct AccountList {
    known: HashMap<u64, String>,
}

impl Authenticator for AccountList {
    async fn authenticate(
        &self,
        seed: u32,
        request: &mut PacketReader,
    ) -> Result<AuthDecision, SessionError> {
        let account = request.read_u64()?;
        let proof = request.read_u32()?;
        let expected = seed ^ (account as u32);
        if proof != expected || !self.known.contains_key(&account) {
            return Ok(AuthDecision::Reject {
                reason: format!("account {account} failed the challenge"),
                replies: vec![Message::new(SMSG_AUTH_RESPONSE, vec![AUTH_UNKNOWN_ACCOUNT])],
            });
        }
        Ok(AuthDecision::Accept {
            actor: ActorId(account),
            replies: vec![Message::new(SMSG_AUTH_RESPONSE, vec![AUTH_OK])],
        })
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    realmwire::init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            let config: DemoConfig = serde_json::from_str(&text)?;
            config.server.validate()?;
            config
        }
        None => DemoConfig::default(),
    };
    tracing::info!(
        addr = %config.server.bind_addr,
        accounts = config.accounts.len(),
        "starting chat relay"
    );

    let server = RealmwireServer::builder()
        .config(config.server)
        .build(
            ChatWorld::new(config.accounts.clone()),
            dispatch_table()?,
            AccountList { known: config.accounts },
        )
        .await?;

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
