/*!

This is the long-form manual for `electoral_systems` and `elecsim`.

## Methods

The following methods are supported:
* `stv` Single Transferable Vote
* `borda` Borda count
* `condorcet` Condorcet pairwise comparison
* `partyList` national party-list proportional representation
* `mmp` mixed-member proportional representation over single-member districts
* `parallel` parallel voting over single-member districts

### `stv`

A multi-winner count over ranked ballots. The quota is the Droop quota,
`floor(votes / (seats + 1)) + 1`, computed once from the number of voters.

Each round, every ballot counts for its first preference that is still in the
race, at its current weight. Then:
- if the best candidate reaches the quota, they are elected. Their surplus
  (votes above the quota) moves on to the next preferences of their ballots:
  each of these ballots keeps `surplus / votes` of its weight.
- otherwise, if the candidates left can just fill the remaining seats, they
  are all elected.
- otherwise, the candidate with the fewest votes is eliminated and their
  ballots move on at full weight.

A candidate elected with exactly the quota has no surplus: their ballots are
used up and leave the count.

The count stops after `maxRounds` rounds (100 by default). The result is then
marked `round_limit_reached`, or the run fails when `failOnRoundLimit` is set.

### `borda`

With `n` candidates, the first preference of a ballot is worth `n - 1` points,
the second `n - 2`, down to 0. Candidates that a ballot does not rank get no
points from it.

### `condorcet`

All the pairs of candidates are compared head to head: a voter prefers A to B
if A comes before B on their ballot, adjacent or not. The Condorcet winner
beats every other candidate. A tie between two candidates counts as a win for
neither, so it may leave the election without a winner. When there is no
winner, the result reports a paradox: the collective preferences form a cycle.

### `partyList`

The seats are shared between the parties with the highest-averages allocator:
- `dhondt`: divisors 1, 2, 3, ...
- `sainteLague`: divisors 1, 3, 5, ...

Parties whose share of the vote is below `threshold` (in percent) get no seats.
The result also reports the natural threshold, `100 / (seats + 1)` percent,
and the Loosemore–Hanby disproportionality index,
`1/2 * sum(|vote % - seat %|)`.

### `mmp`

Each district elects one member: the candidate with the most votes.
The whole assembly (`districts + listSeats`) is then shared proportionally
between the parties above the threshold. Each party gets list seats to top up
its district seats to its entitlement.

When a party wins more districts than its entitlement, it keeps the extra
seats as overhang seats and the assembly grows. The other parties do not get
levelling seats in return.

### `parallel`

The districts are counted the same way as for `mmp`, but only the list seats
are shared proportionally, with no regard for the district results.

## Ties

Every method resolves ties with the same policy, set by `tiebreakMode`:
* `lowestId` (default) the lowest candidate or party id wins the tie
* `useCandidateOrder` the candidate or party declared first wins the tie
* `random` drawing of lots, from the `randomSeed` number. The same seed
  always gives the same draws.

In an STV elimination, "winning" the tie means being eliminated.
Ties that were resolved by the policy are flagged in the results.

## Configuration

The command-line program reads a JSON election file:

```text
{
  "outputSettings": {
    "contestName": "City council",
    "outputDirectory": "."
  },
  "method": "stv",
  "rules": {
    "seats": 2,
    "tiebreakMode": "random",
    "randomSeed": 42
  },
  "parties": [
    {"id": 1, "name": "Greens", "color": "#00aa00"}
  ],
  "candidates": [
    {"id": 1, "name": "Anna", "party_id": 1, "party_name": "Greens", "color": "#00aa00"},
    {"id": 2, "name": "Bob", "party_id": 1, "party_name": "Greens", "color": "#00aa00"}
  ],
  "ballots": [
    {"preferences": [1, 2], "count": 20}
  ]
}
```

The district methods take `districts` and `partyVotes` instead of ballots:

```text
"districts": [
  {"id": 1, "name": "North", "votes": {"1": 500, "2": 300}}
],
"partyVotes": {"1": 4000, "2": 3500}
```

### Ballot files

Ballots may also be read from CSV files listed in `ballotSources`:

```text
"ballotSources": [
  {
    "provider": "csv",
    "filePath": "ballots.csv",
    "idColumnIndex": 1,
    "countColumnIndex": 2,
    "firstVoteColumnIndex": 3,
    "firstVoteRowIndex": 2
  }
]
```

Each row is one ballot. The columns starting at `firstVoteColumnIndex` are the
preferences in order, given as candidate ids or candidate names. Empty cells
are skipped. All the column and row indexes start at 1, and column indexes
may also be spreadsheet letters (`"C"`). Without a count column, each row is
one voter.

```text
id,count,choice 1,choice 2,choice 3
id1,20,Anna,Bob,
id2,15,Bob,,
```

*/
