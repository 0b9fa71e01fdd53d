use huddle_core::{CallerInfo, ClientSignal, ParticipantId, RelaySignal, VoiceUser};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// A message and the participant it goes to.
pub type Delivery = (ParticipantId, RelaySignal);

/// Who is connected and who sits in which voice channel. Pure bookkeeping;
/// the service delivers what it returns.
#[derive(Debug, Default)]
pub struct RelayRouter {
    users: HashMap<ParticipantId, String>,
    channels: HashMap<String, BTreeSet<ParticipantId>>,
    membership: HashMap<ParticipantId, String>,
}

impl RelayRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, participant: ParticipantId, user: String) -> Vec<Delivery> {
        info!("{} connected as {}", user, participant);
        self.users.insert(participant.clone(), user.clone());
        vec![(
            participant.clone(),
            RelaySignal::Welcome {
                participant_id: participant,
                user,
            },
        )]
    }

    pub fn disconnect(&mut self, participant: &ParticipantId) -> Vec<Delivery> {
        let deliveries = self.leave_channel(participant);
        if let Some(user) = self.users.remove(participant) {
            info!("{} ({}) disconnected", user, participant);
        }
        deliveries
    }

    pub fn is_connected(&self, participant: &ParticipantId) -> bool {
        self.users.contains_key(participant)
    }

    pub fn channel_members(&self, channel: &str) -> Vec<ParticipantId> {
        self.channels
            .get(channel)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn route(&mut self, from: &ParticipantId, signal: ClientSignal) -> Vec<Delivery> {
        let Some(user) = self.users.get(from).cloned() else {
            debug!("Dropping {} from unregistered {}", signal.op(), from);
            return Vec::new();
        };

        match signal {
            ClientSignal::Offer { to, sdp, .. } => {
                self.direct(from, to, RelaySignal::Offer { from: from.clone(), sdp })
            }
            ClientSignal::Answer { to, sdp } => {
                self.direct(from, to, RelaySignal::Answer { from: from.clone(), sdp })
            }
            ClientSignal::IceCandidate { to, candidate } => self.direct(
                from,
                to,
                RelaySignal::IceCandidate {
                    from: from.clone(),
                    candidate,
                },
            ),
            ClientSignal::VideoToggle { to, enabled } => self.direct(
                from,
                to,
                RelaySignal::VideoToggle {
                    from: from.clone(),
                    enabled,
                },
            ),
            ClientSignal::AcceptCall { to } => self.direct(
                from,
                to,
                RelaySignal::CallAccepted {
                    from: CallerInfo {
                        user,
                        participant_id: from.clone(),
                    },
                },
            ),
            ClientSignal::RejectCall { to } => {
                self.direct(from, to, RelaySignal::CallRejected { from: from.clone() })
            }
            ClientSignal::EndCall { to } => {
                self.direct(from, to, RelaySignal::CallEnded { from: from.clone() })
            }
            ClientSignal::InitiateCall { to, kind } => {
                let targets: Vec<_> = self
                    .users
                    .iter()
                    .filter(|(participant, name)| **name == to && *participant != from)
                    .map(|(participant, _)| participant.clone())
                    .collect();

                if targets.is_empty() {
                    return vec![error(from, format!("{} is not online", to))];
                }

                info!("{} calls {} ({} connections)", user, to, targets.len());
                let caller = CallerInfo {
                    user,
                    participant_id: from.clone(),
                };
                targets
                    .into_iter()
                    .map(|target| {
                        (
                            target,
                            RelaySignal::IncomingCall {
                                from: caller.clone(),
                                kind,
                            },
                        )
                    })
                    .collect()
            }
            ClientSignal::JoinVoice { channel } => self.join_channel(from, user, channel),
            ClientSignal::LeaveVoice { channel } => {
                if self.membership.get(from) != Some(&channel) {
                    debug!("{} is not in channel {}", from, channel);
                    return Vec::new();
                }
                self.leave_channel(from)
            }
        }
    }

    fn direct(&self, from: &ParticipantId, to: ParticipantId, signal: RelaySignal) -> Vec<Delivery> {
        if !self.users.contains_key(&to) {
            return vec![error(from, format!("participant {} is not connected", to))];
        }
        vec![(to, signal)]
    }

    fn join_channel(&mut self, from: &ParticipantId, user: String, channel: String) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        if self.membership.get(from) == Some(&channel) {
            debug!("{} re-joined channel {}", from, channel);
        } else {
            deliveries.extend(self.leave_channel(from));
        }

        let members = self.channels.entry(channel.clone()).or_default();
        members.remove(from);
        let existing: Vec<VoiceUser> = members
            .iter()
            .map(|participant| VoiceUser {
                participant_id: participant.clone(),
                user: self.users.get(participant).cloned().unwrap_or_default(),
            })
            .collect();
        members.insert(from.clone());
        self.membership.insert(from.clone(), channel.clone());

        info!(
            "{} joined voice channel {} ({} already there)",
            user,
            channel,
            existing.len()
        );

        let joined = VoiceUser {
            participant_id: from.clone(),
            user,
        };
        for member in &existing {
            deliveries.push((
                member.participant_id.clone(),
                RelaySignal::UserJoinedVoice {
                    user: joined.clone(),
                },
            ));
        }
        deliveries.push((from.clone(), RelaySignal::ExistingVoiceUsers { users: existing }));
        deliveries
    }

    fn leave_channel(&mut self, participant: &ParticipantId) -> Vec<Delivery> {
        let Some(channel) = self.membership.remove(participant) else {
            return Vec::new();
        };
        let Some(members) = self.channels.get_mut(&channel) else {
            return Vec::new();
        };
        members.remove(participant);

        let deliveries = members
            .iter()
            .map(|member| {
                (
                    member.clone(),
                    RelaySignal::UserLeftVoice {
                        participant_id: participant.clone(),
                    },
                )
            })
            .collect();
        if members.is_empty() {
            self.channels.remove(&channel);
        }
        info!("{} left voice channel {}", participant, channel);
        deliveries
    }
}

fn error(to: &ParticipantId, message: String) -> Delivery {
    (to.clone(), RelaySignal::Error { message })
}
